//! 推送投递工作者
//!
//! 将一名通知对象展开为其全部设备令牌，并逐令牌调用推送服务。
//! 瞬时故障按指数退避重试；推送服务报告令牌未注册时从仓储回收该
//! 令牌。同一用户的令牌串行处理，避免单个故障令牌的退避等待挤占
//! 兄弟令牌；不同用户之间互相独立。

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};
use uuid::Uuid;

use chat_shared::observability::metrics::{SendResultLabel, record_fcm_send};
use chat_shared::repository::Repository;
use chat_shared::retry::RetryPolicy;

use crate::client::{PushClient, SendError};
use crate::error::PushError;
use crate::payload::NotificationPayload;

/// 向一名用户的所有设备投递通知
///
/// 设备令牌查询失败只跳过该用户（记录日志），不影响同一事件的
/// 其他通知对象。没有注册设备的用户静默成功。
pub async fn deliver_to_user(
    repo: Arc<dyn Repository>,
    client: Arc<dyn PushClient>,
    policy: RetryPolicy,
    user_id: Uuid,
    payload: Arc<NotificationPayload>,
) {
    let tokens = match repo.get_device_tokens_by_user_id(user_id).await {
        Ok(tokens) => tokens,
        Err(e) => {
            error!(error = %e, user_id = %user_id, "查询设备令牌失败，跳过该用户");
            return;
        }
    };

    for token in tokens {
        if let Err(e) = send_to_token(repo.as_ref(), client.as_ref(), &policy, &token, &payload).await
        {
            error!(error = %e, device_token = %token, "推送投递失败");
        }
    }
}

/// 向单个设备令牌投递，直到成功、永久失败或重试耗尽
///
/// 每次对推送服务的调用恰好计数一次（含重试）。令牌回收在一次
/// 投递中至多尝试一次：回收失败视为永久错误结束投递，不再回到
/// 重试循环。
pub async fn send_to_token(
    repo: &dyn Repository,
    client: &dyn PushClient,
    policy: &RetryPolicy,
    token: &str,
    payload: &NotificationPayload,
) -> Result<(), PushError> {
    let started = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        let err = match client.send(token, payload).await {
            Ok(()) => {
                record_fcm_send(SendResultLabel::Ok);
                return Ok(());
            }
            Err(err) => {
                record_fcm_send(SendResultLabel::Error);
                err
            }
        };

        match err {
            SendError::NotRegistered => {
                // 令牌已失效，回收后结束该次投递（删除按令牌幂等）
                return match repo.unregister_device(token).await {
                    Ok(()) => {
                        info!(device_token = %token, "设备令牌已失效，已从仓储回收");
                        Ok(())
                    }
                    Err(e) => Err(PushError::Shared(e)),
                };
            }
            err if err.is_transient() => {
                if !policy.should_retry(started.elapsed()) {
                    return Err(PushError::Send(err));
                }
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    device_token = %token,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "推送失败，将在退避后重试"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            // 永久错误立即放弃
            err => return Err(PushError::Send(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MemoryRepository, ScriptedPushClient, test_payload};
    use std::time::Duration;

    fn no_wait_policy() -> RetryPolicy {
        RetryPolicy::no_wait(Duration::from_secs(5))
    }

    /// 退避窗口为零：首次瞬时失败即放弃
    fn exhausted_policy() -> RetryPolicy {
        RetryPolicy::no_wait(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let repo = MemoryRepository::new();
        let client = ScriptedPushClient::new();
        let payload = test_payload();

        let result =
            send_to_token(&repo, &client, &no_wait_policy(), "T1", &payload).await;

        assert!(result.is_ok());
        assert_eq!(client.calls_for("T1"), 1);
    }

    #[tokio::test]
    async fn test_not_registered_unregisters_once_without_retry() {
        let repo = MemoryRepository::new();
        let client = ScriptedPushClient::new();
        client.script("T1", vec![Err(SendError::NotRegistered)]);
        let payload = test_payload();

        let result =
            send_to_token(&repo, &client, &no_wait_policy(), "T1", &payload).await;

        // 回收成功即结束投递，不再重试
        assert!(result.is_ok());
        assert_eq!(client.calls_for("T1"), 1);
        assert_eq!(repo.unregister_count("T1"), 1);
    }

    #[tokio::test]
    async fn test_unregister_failure_is_permanent() {
        let repo = MemoryRepository::new();
        repo.fail_unregister();
        let client = ScriptedPushClient::new();
        client.script("T1", vec![Err(SendError::NotRegistered)]);
        let payload = test_payload();

        let result =
            send_to_token(&repo, &client, &no_wait_policy(), "T1", &payload).await;

        // 回收失败不回到重试循环
        assert!(result.is_err());
        assert_eq!(client.calls_for("T1"), 1);
    }

    #[tokio::test]
    async fn test_invalid_argument_not_retried() {
        let repo = MemoryRepository::new();
        let client = ScriptedPushClient::new();
        client.script(
            "T1",
            vec![Err(SendError::InvalidArgument("bad payload".to_string()))],
        );
        let payload = test_payload();

        let result =
            send_to_token(&repo, &client, &no_wait_policy(), "T1", &payload).await;

        assert!(result.is_err());
        assert_eq!(client.calls_for("T1"), 1);
        assert!(repo.unregistered().is_empty());
    }

    #[tokio::test]
    async fn test_transient_then_success_retries() {
        let repo = MemoryRepository::new();
        let client = ScriptedPushClient::new();
        client.script(
            "T1",
            vec![
                Err(SendError::Unavailable("503".to_string())),
                Err(SendError::Internal("500".to_string())),
                Ok(()),
            ],
        );
        let payload = test_payload();

        let result =
            send_to_token(&repo, &client, &no_wait_policy(), "T1", &payload).await;

        assert!(result.is_ok());
        assert_eq!(client.calls_for("T1"), 3);
    }

    #[tokio::test]
    async fn test_transient_exhaustion_gives_up() {
        let repo = MemoryRepository::new();
        let client = ScriptedPushClient::new();
        client.script("T1", vec![Err(SendError::Unavailable("503".to_string()))]);
        let payload = test_payload();

        let result =
            send_to_token(&repo, &client, &exhausted_policy(), "T1", &payload).await;

        assert!(result.is_err());
        assert_eq!(client.calls_for("T1"), 1);
    }

    #[tokio::test]
    async fn test_zero_devices_means_zero_sends() {
        let repo = MemoryRepository::new();
        let client = Arc::new(ScriptedPushClient::new());
        let user = Uuid::new_v4();

        deliver_to_user(
            Arc::new(repo),
            client.clone(),
            no_wait_policy(),
            user,
            Arc::new(test_payload()),
        )
        .await;

        assert_eq!(client.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_token_lookup_failure_skips_user() {
        let repo = MemoryRepository::new();
        let user = Uuid::new_v4();
        repo.add_device(user, "T1");
        repo.fail_device_lookup_for(user);
        let client = Arc::new(ScriptedPushClient::new());

        deliver_to_user(
            Arc::new(repo),
            client.clone(),
            no_wait_policy(),
            user,
            Arc::new(test_payload()),
        )
        .await;

        assert_eq!(client.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_tokens_processed_sequentially() {
        let repo = MemoryRepository::new();
        let user = Uuid::new_v4();
        repo.add_device(user, "T1");
        repo.add_device(user, "T2");

        let client = Arc::new(ScriptedPushClient::new());
        client.script(
            "T1",
            vec![Err(SendError::Unavailable("503".to_string())), Ok(())],
        );

        deliver_to_user(
            Arc::new(repo),
            client.clone(),
            no_wait_policy(),
            user,
            Arc::new(test_payload()),
        )
        .await;

        // T1 重试完成后才轮到 T2
        assert_eq!(client.sent_tokens(), vec!["T1", "T1", "T2"]);
    }

    #[tokio::test]
    async fn test_failed_token_does_not_block_siblings() {
        let repo = MemoryRepository::new();
        let user = Uuid::new_v4();
        repo.add_device(user, "T1");
        repo.add_device(user, "T2");

        let client = Arc::new(ScriptedPushClient::new());
        client.script(
            "T1",
            vec![Err(SendError::InvalidArgument("bad".to_string()))],
        );

        deliver_to_user(
            Arc::new(repo),
            client.clone(),
            no_wait_policy(),
            user,
            Arc::new(test_payload()),
        )
        .await;

        // T1 永久失败后 T2 仍被投递
        assert_eq!(client.calls_for("T2"), 1);
    }
}
