use chrono::{DateTime, Duration, Utc};

#[cfg(not(test))]
/// 現在のUTC時間を取得する。
pub fn now() -> DateTime<Utc> {
    Utc::now()
}


#[cfg(test)]
pub use mock_datetime::now;

/// `start`から`end`までの経過ミリ秒を返す。
///
/// 時計が巻き戻った場合でも負の値は返さず、0とする。
pub fn elapsed_millis(start: &DateTime<Utc>, end: &DateTime<Utc>) -> i64 {
    (*end - *start).num_milliseconds().max(0)
}

/// `start`に`millis`ミリ秒を加えた時刻を返す。
pub fn add_millis(start: &DateTime<Utc>, millis: i64) -> DateTime<Utc> {
    *start + Duration::milliseconds(millis)
}
