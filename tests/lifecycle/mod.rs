//! Lifecycle scenarios driven against the in-memory stub provider.

mod bdd_steps;
mod scenarios;
mod test_helpers;
