// End-to-end tests for the survey TTS service.
//
// HTTP tests start the real router on an ephemeral port with a fake synthesis backend and a
// temporary hosting root per test (see `helpers::TestContext`). Pipeline tests drive
// `AssetPipeline` directly for behavior that is awkward to observe over HTTP.

mod helpers;
mod test_client_matcher;
mod test_health;
mod test_pipeline;
