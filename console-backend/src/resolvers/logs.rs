//! Live log streaming for every instance of an app or job.
//!
//! One task follows each pod's log; all of them feed a single bounded channel whose receiving end
//! is the [`LogStream`]. The stream ends once every pod's log has ended. Dropping the stream
//! cancels the followers.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, instrument};

use super::{CLUSTERS, Services, call};
use crate::{
    clients::k8s::{LogLine, LogLines},
    errors::{Error, Result},
};

const LOG_BUFFER: usize = 256;

pub struct LogStream {
    lines: ReceiverStream<Result<LogLine>>,
    _followers: DropGuard,
}

impl Stream for LogStream {
    type Item = Result<LogLine>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.lines).poll_next(cx)
    }
}

impl Services {
    /// Follow the logs of every instance of `name`. `container` defaults to `name`.
    #[instrument(skip(self))]
    pub async fn logs(&self, env: &str, team: &str, name: &str, container: Option<&str>) -> Result<LogStream> {
        let instances = self.instances(env, team, name).await?;
        let container = container.unwrap_or(name);

        let (tx, rx) = mpsc::channel(LOG_BUFFER);
        let cancel = CancellationToken::new();

        for instance in instances {
            let clusters = self.clusters.clone();
            let (tx, cancel) = (tx.clone(), cancel.clone());
            let (env, team, container) = (env.to_string(), team.to_string(), container.to_string());
            let tail_lines = self.log_tail_lines;

            tokio::spawn(async move {
                let logs = clusters.logs(&env, &team, &instance.name, &container, tail_lines);
                let lines = tokio::select! {
                    _ = cancel.cancelled() => return,
                    lines = call(CLUSTERS, "logs", logs) => lines,
                };
                match lines {
                    Ok(lines) => follow(lines, tx, cancel).await,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                    }
                }
                debug!(pod = %instance.name, "Log follower finished");
            });
        }

        Ok(LogStream {
            lines: ReceiverStream::new(rx),
            _followers: cancel.drop_guard(),
        })
    }
}

async fn follow(mut lines: LogLines, tx: mpsc::Sender<Result<LogLine>>, cancel: CancellationToken) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return,
            next = lines.next() => next,
        };
        let item = match next {
            Some(Ok(line)) => Ok(line),
            Some(Err(e)) => Err(Error::unavailable(CLUSTERS, e)),
            None => return,
        };
        let failed = item.is_err();
        if tx.send(item).await.is_err() || failed {
            return;
        }
    }
}
