use dexec_util::errors::DexecError;

#[test]
fn test_io_error_display() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
    let err = DexecError::from(io_err);
    assert!(err.to_string().contains("I/O error"), "got: {err}");
}

#[test]
fn test_unsupported_kind_display() {
    let err = DexecError::UnsupportedReferenceKind {
        schema: "gist".to_string(),
    };
    assert_eq!(err.to_string(), "Unsupported reference kind 'gist'");
}

#[test]
fn test_package_not_found_display() {
    let err = DexecError::PackageNotFound {
        package: "Newtonsoft.Json".to_string(),
        version: "99.0.0".to_string(),
    };
    assert_eq!(err.to_string(), "Package Newtonsoft.Json 99.0.0 not found");
}

#[test]
fn test_network_errors_are_transient() {
    let net = DexecError::Network {
        message: "timeout".to_string(),
    };
    let feed = DexecError::FeedUnavailable {
        feed: "nuget.org".to_string(),
        message: "HTTP 503".to_string(),
    };
    assert!(net.is_transient());
    assert!(feed.is_transient());
}

#[test]
fn test_resolution_errors_are_not_transient() {
    let err = DexecError::NoVersionsFound {
        package: "Missing.Package".to_string(),
    };
    assert!(!err.is_transient());
    assert!(!DexecError::OperationCancelled.is_transient());
    assert!(DexecError::OperationCancelled.is_cancelled());
}
