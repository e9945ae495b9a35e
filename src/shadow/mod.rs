//! Shadow testing: replay production requests against shadow agents and
//! compare the results

pub mod coordinator;
pub mod dispatcher;
pub mod record;

pub use coordinator::{
    tag_request, ShadowCoordinator, PRODUCTION_AGENT_KEY, SHADOW_MARKER_KEY, SHADOW_TEST_ID_KEY,
};
pub use dispatcher::{
    DispatchError, ShadowDispatcher, ShadowExecutionError, ShadowExecutor, ShadowJob,
};
pub use record::{ShadowSummary, ShadowTestRecord, ShadowTestStatus};
