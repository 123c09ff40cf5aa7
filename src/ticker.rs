use std::time::Duration;

use log::debug;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// 計測中のタイマーを更新するための通知。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickSignal {
    /// 通知を送った`Ticker`の識別子。
    pub ticker_id: u64,
}

/// 一定間隔で`TickSignal`を送るタスク。
///
/// `cancel`を呼び出した後、タスクは次に実行された時点で終了し、それ以降は通知を送らない。
/// dropした場合も`cancel`と同様に停止する。
pub struct Ticker {
    id: u64,
    cancellation: CancellationToken,
    handle: JoinHandle<()>,
}

impl Ticker {
    /// 新しいタスクを起動して`Ticker`を返す。
    ///
    /// 最初の通知は起動してから`period`経過した時点で送られる。
    ///
    /// # Arguments
    ///
    /// * `id` - 通知に含める識別子
    /// * `period` - 通知の間隔
    /// * `sender` - 通知の送信先
    pub fn spawn(id: u64, period: Duration, sender: UnboundedSender<TickSignal>) -> Self {
        let cancellation = CancellationToken::new();
        let cancel = cancellation.clone();
        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!("Ticker {} cancelled", id);
                        break;
                    }
                    _ = interval.tick() => {
                        if sender.send(TickSignal { ticker_id: id }).is_err() {
                            debug!("Ticker {} receiver closed", id);
                            break;
                        }
                    }
                }
            }
        });
        debug!("Ticker {} started: period={:?}", id, period);

        Self {
            id,
            cancellation,
            handle,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// タスクの停止を要求する。即座に戻る。
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            debug!("Ticker {} dropped while running", self.id);
        }
        self.cancellation.cancel();
    }
}
