//! Test modules for the sky-tracker binary.

mod flow_tests;
