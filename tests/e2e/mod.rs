// End-to-end tests for the audiobook pipeline
//
// Every test gets its own data directory (SQLite job store, uploads, chunk
// cache and output) through test-context lifecycle hooks, so tests run in
// parallel without sharing state. The speech service is an in-process fake
// unless a test mounts a wiremock server in front of the real HTTP client.

mod helpers;
mod test_cache;
mod test_health;
mod test_jobs;
mod test_speech_service;
