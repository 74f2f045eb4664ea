//! Integration tests for the harvester
//!
//! These tests run the coordinator end to end against a wiremock news site:
//! paginated listing, detail pages and PNG images.

mod harvest_tests;
mod resume_tests;
mod site;
