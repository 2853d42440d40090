// Event system test module
mod error_tests;
mod interface_tests;
mod store_tests;
mod types_tests;
