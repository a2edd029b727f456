mod engine_process_test;
mod run_test;
mod support;
