//! # 期限切れトークンの定期削除
//!
//! `ExpiredTokenReaper` は1回分の削除処理だけを持ち、周期実行は `Scheduler` に任せる。
//! 失敗はログに残し、次の周期で再試行する（即時の再試行はしない）。

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::error::RepositoryError;
use crate::repository::TokenRepository;

/// 周期タスク1回分の非同期処理。
pub type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// 周期実行されるタスク。
pub type ScheduledTask = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

/// 周期実行の抽象化。
pub trait Scheduler: Send + Sync {
    /// `period` ごとに `task` を実行する。最初の実行は1周期後。
    fn every_interval(&self, period: Duration, task: ScheduledTask);
}

/// tokioのタイマーによるScheduler。
#[derive(Default)]
pub struct TokioScheduler {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登録済みのタスクをすべて停止する。
    pub fn shutdown(&self) {
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        for handle in handles.drain(..) {
            handle.abort();
        }
    }
}

impl Scheduler for TokioScheduler {
    fn every_interval(&self, period: Duration, task: ScheduledTask) {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                task().await;
            }
        });
        self.handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle);
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// 期限切れトークンの削除処理。
pub struct ExpiredTokenReaper {
    tokens: Arc<dyn TokenRepository>,
    clock: Arc<dyn Clock>,
}

impl ExpiredTokenReaper {
    pub fn new(tokens: Arc<dyn TokenRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { tokens, clock }
    }

    /// `expires_at < now` のトークンを削除し、件数を返す。
    pub async fn sweep(&self) -> Result<u64, RepositoryError> {
        self.tokens.delete_expired_before(self.clock.now()).await
    }

    /// 1周期分の処理。結果はログにのみ出す。
    pub async fn tick(&self) {
        match self.sweep().await {
            Ok(0) => {}
            Ok(removed) => tracing::info!(removed, "期限切れトークンを削除しました"),
            Err(e) => tracing::warn!(error = %e, "期限切れトークンの削除に失敗しました（次の周期で再試行）"),
        }
    }

    /// スケジューラに周期実行を登録する。
    pub fn schedule(self: Arc<Self>, scheduler: &dyn Scheduler, period: Duration) {
        let task: ScheduledTask = Arc::new(move || -> TaskFuture {
            let reaper = self.clone();
            Box::pin(async move { reaper.tick().await })
        });
        scheduler.every_interval(period, task);
        tracing::info!(period_secs = period.as_secs(), "期限切れトークンの定期削除を登録しました");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::repository::MemoryTokenRepository;
    use chrono::Utc;
    use signlink_types::Token;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn token(value: &str, expires_in_minutes: i64, clock: &ManualClock) -> Token {
        let now = clock.now();
        Token {
            value: value.to_string(),
            contract_id: 1,
            created_at: now,
            expires_at: now + chrono::Duration::minutes(expires_in_minutes),
        }
    }

    /// 登録されたタスクを保持し、手動で発火させるScheduler。
    #[derive(Default)]
    struct ManualScheduler {
        tasks: Mutex<Vec<(Duration, ScheduledTask)>>,
    }

    impl ManualScheduler {
        async fn fire_all(&self) {
            let tasks: Vec<ScheduledTask> =
                self.tasks.lock().unwrap().iter().map(|(_, t)| t.clone()).collect();
            for task in tasks {
                task().await;
            }
        }
    }

    impl Scheduler for ManualScheduler {
        fn every_interval(&self, period: Duration, task: ScheduledTask) {
            self.tasks.lock().unwrap().push((period, task));
        }
    }

    /// 常に失敗するトークンストア。
    struct FailingTokens;

    #[async_trait::async_trait]
    impl TokenRepository for FailingTokens {
        async fn insert(&self, _token: Token) -> Result<(), RepositoryError> {
            Err(RepositoryError::Backend("down".into()))
        }
        async fn find_by_value(&self, _value: &str) -> Result<Option<Token>, RepositoryError> {
            Err(RepositoryError::Backend("down".into()))
        }
        async fn delete_by_value(&self, _value: &str) -> Result<u64, RepositoryError> {
            Err(RepositoryError::Backend("down".into()))
        }
        async fn delete_by_contract_id(&self, _id: u64) -> Result<u64, RepositoryError> {
            Err(RepositoryError::Backend("down".into()))
        }
        async fn delete_expired_before(
            &self,
            _now: chrono::DateTime<Utc>,
        ) -> Result<u64, RepositoryError> {
            Err(RepositoryError::Backend("down".into()))
        }
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let tokens = Arc::new(MemoryTokenRepository::new());
        tokens.insert(token("a", 5, &clock)).await.unwrap();
        tokens.insert(token("b", 30, &clock)).await.unwrap();

        let reaper = ExpiredTokenReaper::new(tokens.clone(), clock.clone());
        assert_eq!(reaper.sweep().await.unwrap(), 0);

        clock.advance(chrono::Duration::minutes(10));
        assert_eq!(reaper.sweep().await.unwrap(), 1);
        assert!(tokens.find_by_value("a").await.unwrap().is_none());
        assert!(tokens.find_by_value("b").await.unwrap().is_some());

        // 削除済みの再削除は何もしない
        assert_eq!(reaper.sweep().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_scheduled_tick_runs_sweep() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let tokens = Arc::new(MemoryTokenRepository::new());
        tokens.insert(token("a", 1, &clock)).await.unwrap();

        let scheduler = ManualScheduler::default();
        let reaper = Arc::new(ExpiredTokenReaper::new(tokens.clone(), clock.clone()));
        reaper.schedule(&scheduler, Duration::from_secs(300));
        assert_eq!(scheduler.tasks.lock().unwrap()[0].0, Duration::from_secs(300));

        clock.advance(chrono::Duration::minutes(2));
        scheduler.fire_all().await;
        assert!(tokens.is_empty().await);
    }

    #[tokio::test]
    async fn test_tick_survives_backend_failure() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let reaper = ExpiredTokenReaper::new(Arc::new(FailingTokens), clock);
        assert!(reaper.sweep().await.is_err());
        reaper.tick().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_fires_each_period() {
        let count = Arc::new(AtomicUsize::new(0));
        let scheduler = TokioScheduler::new();
        let counter = count.clone();
        scheduler.every_interval(
            Duration::from_secs(60),
            Arc::new(move || -> TaskFuture {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            }),
        );

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        scheduler.shutdown();
    }
}
