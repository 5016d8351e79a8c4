use std::sync::Arc;
use std::time::Duration;

use agentchat::channel::FakeChannel;
use agentchat::config::Config;
use agentchat::retry::RetryPolicy;
use agentchat::ChatClient;

/// One content-delta event record
#[allow(dead_code)]
pub fn delta(text: &str) -> String {
    format!(
        "data: {{'contentBlockDelta': {{'delta': {{'text': '{}'}}}}}}\n\n",
        text
    )
}

/// Configuration with a fixed session id and no real endpoint
#[allow(dead_code)]
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.runtime.session_id = Some("it-session".to_string());
    config
}

/// Client over `channel` with millisecond backoff
#[allow(dead_code)]
pub fn fake_client(channel: &FakeChannel) -> ChatClient {
    ChatClient::new(Arc::new(channel.clone()), &test_config()).with_retry_policy(
        RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5), false),
    )
}
