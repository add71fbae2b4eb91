mod components;
mod failures;
mod reconciliation;
