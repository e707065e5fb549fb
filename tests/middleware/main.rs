mod builder_test;
mod common;
mod error_pages_test;
mod retry_test;
