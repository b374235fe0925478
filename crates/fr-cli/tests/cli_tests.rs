use clap::{CommandFactory, FromArgMatches};
use fr_api_contract::IoType;
use fr_cli::{chunk_text, Cli};
use mockito::{Matcher, Server};
use serde_json::json;

const CONNECTION: [&str; 6] = [
    "--api-key",
    "token",
    "--flow-id",
    "F",
    "--namespace-id",
    "N",
];

fn parse(positional: &[&str]) -> Result<Cli, clap::Error> {
    let mut args = vec!["fr"];
    args.extend_from_slice(positional);
    args.extend_from_slice(&CONNECTION);
    parse_args(args)
}

/// Parse flags only, ignoring any `LANGFLOW_*` / `FLOWRUN_*` variables in the environment
fn parse_args(args: Vec<&str>) -> Result<Cli, clap::Error> {
    let matches = Cli::command()
        .mut_args(|arg| arg.env(None::<&'static str>))
        .try_get_matches_from(args)?;
    Cli::from_arg_matches(&matches)
}

#[test]
fn test_cli_parsing_defaults() {
    let cli = parse(&["hello there"]).unwrap();

    assert_eq!(cli.message, "hello there");
    assert_eq!(cli.input_type, IoType::Chat);
    assert_eq!(cli.output_type, IoType::Chat);
    assert!(!cli.stream_requested());
}

#[test]
fn test_cli_parsing_all_positionals() {
    let cli = parse(&["hi", "text", "any", "true"]).unwrap();

    assert_eq!(cli.input_type, IoType::Text);
    assert_eq!(cli.output_type, IoType::Any);
    assert!(cli.stream_requested());
}

#[test]
fn test_stream_needs_literal_true() {
    for value in ["TRUE", "yes", "1", "false"] {
        let cli = parse(&["hi", "chat", "chat", value]).unwrap();
        assert!(!cli.stream_requested(), "{value} should not enable streaming");
    }
}

#[test]
fn test_missing_message_is_a_usage_error() {
    let err = parse_args(["fr"].into_iter().chain(CONNECTION).collect()).unwrap_err();

    assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
}

#[test]
fn test_chunk_text() {
    assert_eq!(chunk_text(&json!({ "chunk": "hello" })), Some("hello"));
    assert_eq!(chunk_text(&json!({ "event": "token" })), None);
}

#[tokio::test]
async fn test_run_prints_final_answer() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/lf/N/api/v1/run/F")
        .match_query(Matcher::UrlEncoded("stream".into(), "false".into()))
        .match_header("authorization", "Bearer token")
        .with_status(200)
        .with_body(
            json!({"outputs": [{"outputs": [{"outputs": {"message": {"message": {"text": "hello"}}}}]}]})
                .to_string(),
        )
        .create_async()
        .await;

    let url = server.url();
    let cli = parse(&["hi", "--base-url", &url]).unwrap();

    cli.run().await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_run_fails_on_remote_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/lf/N/api/v1/run/F")
        .match_query(Matcher::Any)
        .with_status(404)
        .with_body(r#"{"detail":"not found"}"#)
        .create_async()
        .await;

    let url = server.url();
    let cli = parse(&["hi", "--base-url", &url]).unwrap();

    let err = cli.run().await.unwrap_err();
    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn test_run_fails_on_unexpected_shape() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/lf/N/api/v1/run/F")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"outputs": []}"#)
        .create_async()
        .await;

    let url = server.url();
    let cli = parse(&["hi", "--base-url", &url]).unwrap();

    let err = cli.run().await.unwrap_err();
    assert!(err.to_string().contains("no flow outputs"));
}

#[tokio::test]
async fn test_run_streams_until_close() {
    let mut server = Server::new_async().await;
    let stream_url = format!("{}/stream/1", server.url());
    server
        .mock("POST", "/lf/N/api/v1/run/F")
        .match_query(Matcher::UrlEncoded("stream".into(), "true".into()))
        .with_status(200)
        .with_body(
            json!({"outputs": [{"outputs": [{"artifacts": {"stream_url": stream_url}}]}]})
                .to_string(),
        )
        .create_async()
        .await;
    server
        .mock("GET", "/stream/1")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body("data: {\"chunk\":\"hel\"}\n\ndata: {\"chunk\":\"lo\"}\n\nevent: close\ndata: bye\n\n")
        .create_async()
        .await;

    let url = server.url();
    let cli = parse(&["hi", "chat", "chat", "true", "--base-url", &url]).unwrap();

    cli.run().await.unwrap();
}

#[tokio::test]
async fn test_run_reports_broken_stream() {
    let mut server = Server::new_async().await;
    let stream_url = format!("{}/stream/1", server.url());
    server
        .mock("POST", "/lf/N/api/v1/run/F")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            json!({"outputs": [{"outputs": [{"artifacts": {"stream_url": stream_url}}]}]})
                .to_string(),
        )
        .create_async()
        .await;
    server
        .mock("GET", "/stream/1")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body("data: {\"chunk\":\"hel\"}\n\n")
        .create_async()
        .await;

    let url = server.url();
    let cli = parse(&["hi", "chat", "chat", "true", "--base-url", &url]).unwrap();

    let err = cli.run().await.unwrap_err();
    assert!(err.to_string().starts_with("stream failed"));
}
