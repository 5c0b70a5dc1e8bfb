mod helpers;

mod remove_tests;
mod scenario_tests;
