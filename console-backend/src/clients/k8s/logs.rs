use chrono::{DateTime, Utc};
use futures::{AsyncBufRead, AsyncBufReadExt, Stream, StreamExt};

use super::LogLine;

/// Split a line produced with `timestamps=true` into its RFC 3339 timestamp and message.
///
/// Lines without a parseable timestamp are kept whole and stamped with `now`.
pub fn parse_log_line(line: &str, instance: &str, now: DateTime<Utc>) -> LogLine {
    let parsed = line.split_once(' ').and_then(|(timestamp, message)| {
        DateTime::parse_from_rfc3339(timestamp)
            .ok()
            .map(|time| (time.with_timezone(&Utc), message))
    });

    let (time, message) = parsed.unwrap_or((now, line));
    LogLine {
        time,
        message: message.to_string(),
        instance: instance.to_string(),
    }
}

pub(super) fn lines<R>(reader: R, instance: String) -> impl Stream<Item = anyhow::Result<LogLine>>
where
    R: AsyncBufRead,
{
    reader.lines().map(move |line| {
        line.map(|line| parse_log_line(&line, &instance, Utc::now()))
            .map_err(anyhow::Error::from)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn splits_timestamp_from_message() {
        let now = Utc::now();
        let line = parse_log_line("2024-05-01T10:00:00.123456789Z starting server on :8080", "console-abc", now);

        assert_eq!(line.time, Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap() + chrono::Duration::nanoseconds(123_456_789));
        assert_eq!(line.message, "starting server on :8080");
        assert_eq!(line.instance, "console-abc");
    }

    #[test]
    fn lines_without_timestamp_are_kept() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let line = parse_log_line("panic: oh no", "console-abc", now);
        assert_eq!(line.time, now);
        assert_eq!(line.message, "panic: oh no");
    }

    #[tokio::test]
    async fn reads_lines_from_a_reader() {
        let input = "2024-05-01T10:00:00Z first\n2024-05-01T10:00:01Z second\n";
        let reader = futures::io::Cursor::new(input.as_bytes().to_vec());

        let collected: Vec<String> = lines(reader, "pod".to_string())
            .map(|line| line.unwrap().message)
            .collect()
            .await;

        assert_eq!(collected, vec!["first", "second"]);
    }
}
