use dexec_util::cancel::CancelToken;
use dexec_util::errors::DexecError;
use dexec_util::process::CommandBuilder;

#[cfg(unix)]
#[tokio::test]
async fn test_builder_simple_command() {
    let output = CommandBuilder::new("echo")
        .arg("hello")
        .exec(&CancelToken::new())
        .await
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), "hello");
}

#[cfg(unix)]
#[tokio::test]
async fn test_builder_with_env() {
    let output = CommandBuilder::new("sh")
        .arg("-c")
        .arg("echo $MY_TEST_VAR")
        .env("MY_TEST_VAR", "dexec_test_value")
        .exec(&CancelToken::new())
        .await
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), "dexec_test_value");
}

#[cfg(unix)]
#[tokio::test]
async fn test_exec_checked_reports_failure() {
    let err = CommandBuilder::new("sh")
        .args(["-c", "echo broken >&2; exit 3"])
        .exec_checked(&CancelToken::new())
        .await
        .unwrap_err();
    match err {
        DexecError::Build { message } => assert!(message.contains("broken"), "{message}"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_builder_nonexistent_program() {
    let result = CommandBuilder::new("nonexistent_program_xyz_123")
        .exec(&CancelToken::new())
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_cancelled_token_skips_spawn() {
    let token = CancelToken::new();
    token.cancel();
    let result = CommandBuilder::new("echo").arg("x").exec(&token).await;
    assert!(matches!(result, Err(DexecError::OperationCancelled)));
}
