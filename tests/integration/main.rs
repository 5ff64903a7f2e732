//! Integration tests wiring the admission service to in-memory stores.

mod admission_test;
mod concurrency_test;
mod failure_test;
mod helpers;
mod reaper_test;
mod scenario_test;
