/*!
# pvemon DevKit - test doubles for the pvemon agent

- `MockApiClient`: canned Proxmox API responses per path, with a call log
- `RecordingSink`: captures every reported metric
- `fixtures`: realistic API payloads
- `TestHarness`: wires the above into poll/task contexts
*/

pub mod fixtures;
pub mod mock_api;
pub mod recording_sink;
pub mod test_utils;

pub use mock_api::MockApiClient;
pub use recording_sink::RecordingSink;
pub use test_utils::TestHarness;
