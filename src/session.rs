use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info};
use tokio::sync::mpsc::UnboundedSender;

use crate::auth::User;
use crate::report::Report;
use crate::ticker::{TickSignal, Ticker};
use crate::time_entry::{ProjectCatalog, TaskInput, TimeEntry};
use crate::timer::{TimerError, TimerManager};

/// `Ticker`の識別子。セッションをまたいで重複しない。
static NEXT_TICKER_ID: AtomicU64 = AtomicU64::new(1);

/// ログインからログアウトまでのセッション。
///
/// タイムエントリーと、計測中のタイマーを更新する`Ticker`を所有する。
/// `Ticker`はタイマーの停止、セッションの破棄と同時に停止する。
pub struct Session {
    user: User,
    timer: TimerManager,
    ticker: Option<Ticker>,
    tick_period: Duration,
    tick_sender: UnboundedSender<TickSignal>,
}

impl Session {
    /// 新しい`Session`を返す。
    ///
    /// # Arguments
    ///
    /// * `user` - ログインしたユーザー
    /// * `catalog` - 選択可能なプロジェクトの一覧
    /// * `tick_period` - 計測中のタイマーを更新する間隔
    /// * `tick_sender` - `Ticker`からの通知の送信先
    pub fn new(
        user: User,
        catalog: ProjectCatalog,
        tick_period: Duration,
        tick_sender: UnboundedSender<TickSignal>,
    ) -> Self {
        info!("Session opened for {}", user.id);
        Self {
            user,
            timer: TimerManager::new(catalog),
            ticker: None,
            tick_period,
            tick_sender,
        }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    /// タイマーを開始し、計測中のタイマーの更新を始める。
    pub fn start(&mut self, input: &TaskInput, now: DateTime<Utc>) -> Result<TimeEntry, TimerError> {
        let entry = self.timer.start(input, &self.user.id, now)?.clone();

        let ticker_id = NEXT_TICKER_ID.fetch_add(1, Ordering::Relaxed);
        self.ticker = Some(Ticker::spawn(
            ticker_id,
            self.tick_period,
            self.tick_sender.clone(),
        ));

        Ok(entry)
    }

    /// 計測中のタイマーの更新を止めてから、タイマーを停止する。
    pub fn stop(&mut self, now: DateTime<Utc>) -> Result<TimeEntry, TimerError> {
        self.cancel_ticker();
        self.timer.stop(now).cloned()
    }

    /// `Ticker`からの通知を反映する。
    ///
    /// 停止済みの`Ticker`から届いた通知は無視する。
    pub fn on_tick(&mut self, signal: TickSignal, now: DateTime<Utc>) -> Option<i64> {
        match &self.ticker {
            Some(ticker) if ticker.id() == signal.ticker_id => self.timer.tick(now),
            _ => {
                debug!("Ignoring stale tick from ticker {}", signal.ticker_id);
                None
            }
        }
    }

    /// 計測中のタイマーを更新してから集計結果を返す。
    pub fn report(&mut self, now: DateTime<Utc>) -> Report {
        self.timer.report(now)
    }

    /// 計測中のタイマーを更新してから、そのエントリーを返す。
    pub fn refresh_active(&mut self, now: DateTime<Utc>) -> Option<&TimeEntry> {
        self.timer.tick(now);
        self.timer.active()
    }

    pub fn entries(&self) -> &[TimeEntry] {
        self.timer.entries()
    }

    pub fn active(&self) -> Option<&TimeEntry> {
        self.timer.active()
    }

    pub fn catalog(&self) -> &ProjectCatalog {
        self.timer.catalog()
    }

    /// セッションを破棄する。`Ticker`を停止し、全てのエントリーを破棄する。
    pub fn teardown(&mut self) {
        self.cancel_ticker();
        self.timer.session_reset();
        info!("Session closed for {}", self.user.id);
    }

    fn cancel_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel_ticker();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{DateTime, TimeZone, Utc};
    use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

    use super::Session;
    use crate::auth::User;
    use crate::ticker::TickSignal;
    use crate::time_entry::{ProjectCatalog, TaskInput};
    use crate::timer::TimerError;

    fn at(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    fn session() -> (Session, UnboundedReceiver<TickSignal>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (session_with(sender), receiver)
    }

    fn session_with(sender: UnboundedSender<TickSignal>) -> Session {
        let user = User {
            id: "user1@example.com".to_string(),
            display_name: "User One".to_string(),
        };
        Session::new(
            user,
            ProjectCatalog::default(),
            Duration::from_secs(1),
            sender,
        )
    }

    fn design_doc() -> TaskInput {
        TaskInput::new("Design doc", "coding", "1")
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_tick_stop() {
        let (mut session, mut receiver) = session();

        let entry = session.start(&design_doc(), at(1000)).unwrap();
        assert_eq!(entry.owner_id, "user1@example.com");

        let signal = receiver.recv().await.unwrap();
        assert_eq!(session.on_tick(signal, at(2500)), Some(1500));

        let entry = session.stop(at(3000)).unwrap();
        assert_eq!(entry.duration, 2000);
        assert!(session.active().is_none());
    }

    /// 停止後に届いた通知は停止済みのエントリーを変更しない。
    #[tokio::test(start_paused = true)]
    async fn test_stale_tick_after_stop_is_ignored() {
        let (mut session, mut receiver) = session();
        session.start(&design_doc(), at(1000)).unwrap();
        let signal = receiver.recv().await.unwrap();

        session.stop(at(3000)).unwrap();

        assert_eq!(session.on_tick(signal, at(9000)), None);
        assert_eq!(session.entries()[0].duration, 2000);
    }

    /// 前回の`Ticker`の通知は、次に開始したタイマーに反映されない。
    #[tokio::test(start_paused = true)]
    async fn test_tick_from_previous_ticker_is_ignored() {
        let (mut session, mut receiver) = session();
        session.start(&design_doc(), at(1000)).unwrap();
        let old_signal = receiver.recv().await.unwrap();
        session.stop(at(2000)).unwrap();
        session.start(&design_doc(), at(3000)).unwrap();

        assert_eq!(session.on_tick(old_signal, at(5000)), None);
        assert_eq!(session.active().unwrap().duration, 0);

        let signal = receiver.recv().await.unwrap();
        assert_ne!(signal, old_signal);
        assert_eq!(session.on_tick(signal, at(5000)), Some(2000));
    }

    /// 破棄したセッションの通知は、同じチャネルを使う次のセッションに反映されない。
    #[tokio::test(start_paused = true)]
    async fn test_tick_from_previous_session_is_ignored() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let mut previous = session_with(sender.clone());
        previous.start(&design_doc(), at(1000)).unwrap();
        let old_signal = receiver.recv().await.unwrap();
        previous.teardown();

        let mut next = session_with(sender);
        next.start(&design_doc(), at(3000)).unwrap();

        assert_eq!(next.on_tick(old_signal, at(5000)), None);
        assert_eq!(next.active().unwrap().duration, 0);
    }

    #[tokio::test]
    async fn test_errors_leave_state_untouched() {
        let (mut session, _receiver) = session();

        assert_eq!(session.stop(at(0)).unwrap_err(), TimerError::NoActiveTimer);
        assert_eq!(
            session.start(&TaskInput::default(), at(0)).unwrap_err(),
            TimerError::MissingTaskName
        );
        session.start(&design_doc(), at(0)).unwrap();
        assert_eq!(
            session.start(&design_doc(), at(10)).unwrap_err(),
            TimerError::ActiveTimerExists
        );
        assert_eq!(session.entries().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_discards_entries() {
        let (mut session, mut receiver) = session();
        session.start(&design_doc(), at(0)).unwrap();
        session.stop(at(1000)).unwrap();
        session.start(&design_doc(), at(2000)).unwrap();
        let signal = receiver.recv().await.unwrap();

        session.teardown();

        assert!(session.entries().is_empty());
        assert!(session.active().is_none());
        assert_eq!(session.on_tick(signal, at(5000)), None);
    }

    #[tokio::test]
    async fn test_report_includes_live_duration() {
        let (mut session, _receiver) = session();
        session.start(&design_doc(), at(0)).unwrap();
        session.stop(at(2000)).unwrap();
        session.start(&TaskInput::new("Hiring", "recruitment", "2"), at(3000)).unwrap();

        let report = session.report(at(3500));

        assert_eq!(report.total, 2500);
        assert_eq!(report.projects[1].duration, 500);
    }
}
