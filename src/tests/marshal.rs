use std::any::type_name;
use std::error::Error as StdError;
use std::io;

use serde_json::json;

use crate::marshal::{self, decode, encode};
use crate::tests::common::{ArgumentError, Opaque};
use crate::{MarshalError, WorkError};

#[test]
fn native_error_round_trip() {
    let bytes = encode(&ArgumentError("Foo bar bar bar".into()), Some("trace"));
    match decode::<ArgumentError>(&bytes).unwrap() {
        WorkError::Original { error, trace } => {
            assert_eq!(error, ArgumentError("Foo bar bar bar".into()));
            assert_eq!(trace.as_deref(), Some("trace"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn os_error_keeps_its_kind() {
    let bytes = encode(&io::Error::from_raw_os_error(libc::ENOENT), None);
    let err = decode::<io::Error>(&bytes).unwrap();
    assert!(!err.is_degraded());
    let err = err.into_error().unwrap();
    assert_eq!(err.kind(), io::ErrorKind::NotFound);
    assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
}

#[test]
fn custom_io_error_is_rebuilt() {
    let bytes = encode(&io::Error::other("disk on fire"), Some("trace"));
    let err = decode::<io::Error>(&bytes).unwrap();
    assert!(matches!(err, WorkError::Rebuilt { .. }));
    assert!(err.is_degraded());
    assert_eq!(err.message(), "disk on fire");
    assert_eq!(err.trace(), Some("trace"));
    assert_eq!(err.error().unwrap().kind(), io::ErrorKind::Other);
}

#[test]
fn boxed_error_is_rebuilt() {
    let original: Box<dyn StdError + Send + Sync> = "something broke".into();
    let bytes = encode(&original, None);
    let err = decode::<Box<dyn StdError + Send + Sync>>(&bytes).unwrap();
    assert!(matches!(err, WorkError::Rebuilt { .. }));
    assert_eq!(err.to_string(), "something broke");
}

#[test]
fn opaque_error_falls_back() {
    let bytes = encode(&Opaque("no way back".into()), Some("trace"));
    let err = decode::<Opaque>(&bytes).unwrap();
    let WorkError::Fallback(remote) = &err else {
        panic!("unexpected {:?}", err);
    };
    assert_eq!(remote.type_name, type_name::<Opaque>());
    assert_eq!(remote.message, "no way back");
    assert_eq!(remote.trace.as_deref(), Some("trace"));
    assert_eq!(err.to_string(), "marshalling error with: no way back");
    assert!(err.error().is_none());
}

#[test]
fn native_payload_for_other_type_is_rebuilt() {
    let bytes = encode(&ArgumentError("wrong type".into()), None);
    match decode::<String>(&bytes).unwrap() {
        WorkError::Rebuilt { error, .. } => assert_eq!(error, "wrong type"),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn native_payload_for_other_type_falls_back() {
    let bytes = encode(&"plain string".to_owned(), None);
    let err = decode::<ArgumentError>(&bytes).unwrap();
    let WorkError::Fallback(remote) = err else {
        panic!("unexpected {:?}", err);
    };
    assert_eq!(remote.type_name, type_name::<String>());
    assert_eq!(remote.message, "plain string");
}

#[test]
fn corrupt_native_body_degrades() {
    let bytes = serde_json::to_vec(&json!({
        "version": 1,
        "tier": "native",
        "type_name": type_name::<ArgumentError>(),
        "message": "unreadable",
        "trace": null,
        "body": [1, 2, 3],
    }))
    .unwrap();
    let err = decode::<ArgumentError>(&bytes).unwrap();
    assert!(matches!(err, WorkError::Fallback(_)));
    assert_eq!(err.message(), "unreadable");
}

#[test]
fn unknown_version_is_rejected() {
    let bytes = serde_json::to_vec(&json!({
        "version": 2,
        "tier": "fallback",
        "type_name": "x",
        "message": "y",
        "trace": null,
    }))
    .unwrap();
    match decode::<String>(&bytes) {
        Err(MarshalError::Invalid(msg)) => assert_eq!(msg, "unsupported version 2"),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn garbage_is_rejected() {
    assert!(matches!(
        decode::<String>(b"not json at all"),
        Err(MarshalError::Json(_))
    ));
}

#[test]
fn panic_payloads() {
    let err = decode::<String>(&marshal::encode_panic(&"static message", Some("trace"))).unwrap();
    let WorkError::Panicked(remote) = &err else {
        panic!("unexpected {:?}", err);
    };
    assert_eq!(remote.type_name, "panic");
    assert_eq!(remote.message, "static message");
    assert_eq!(remote.trace.as_deref(), Some("trace"));
    assert_eq!(err.to_string(), "work panicked: static message");

    let err = decode::<String>(&marshal::encode_panic(&format!("code {}", 7), None)).unwrap();
    assert_eq!(err.message(), "code 7");

    let err = decode::<String>(&marshal::encode_panic(&42u32, None)).unwrap();
    assert_eq!(err.message(), "Box<dyn Any>");
}

#[test]
fn panic_message_with_awkward_characters() {
    let message = "quote \" backslash \\ nul \0 bell \u{7} emoji \u{1f4a5}";
    let bytes = marshal::encode_panic(&message, None);
    assert!(!bytes.is_empty());
    assert_eq!(decode::<String>(&bytes).unwrap().message(), message);
}

#[test]
fn forced_fallback_ignores_target_type() {
    let bytes = marshal::encode_fallback(&io::Error::other("redirect failed"), None);
    let err = decode::<String>(&bytes).unwrap();
    let WorkError::Fallback(remote) = err else {
        panic!("unexpected {:?}", err);
    };
    assert_eq!(remote.type_name, type_name::<io::Error>());
    assert_eq!(remote.message, "redirect failed");
}

#[test]
fn remote_error_display() {
    let remote = crate::RemoteError {
        type_name: "app::Error".into(),
        message: "bad".into(),
        trace: None,
    };
    assert_eq!(remote.to_string(), "app::Error: bad");
}
