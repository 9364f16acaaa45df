mod common;
mod marshal;
mod outcome;

use crate::{ErrorOutput, MarshalError, Outcome, RawTermination, RemoteError};

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn public_types_are_send_and_sync() {
    assert_send_sync::<Outcome>();
    assert_send_sync::<RawTermination>();
    assert_send_sync::<RemoteError>();
    assert_send_sync::<MarshalError>();
    assert_send_sync::<ErrorOutput>();
}
