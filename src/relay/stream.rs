//! 上游字节流转发与 ping 保活
//!
//! 每个中继调用启动一个 pump 任务，独占上游流和保活定时器：
//! - 上游数据块原样、按序写入 channel
//! - 定时器到期时写入完整的 ping 帧（只会落在两个数据块之间）
//! - 响应体被丢弃（客户端断开）时 drop guard 取消 token，pump 退出，
//!   上游流和定时器随 pump 作用域一起释放

use std::io;
use std::pin::{Pin, pin};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::Instrument;

/// ping 保活帧
pub const PING_FRAME: &[u8] = b"event: ping\ndata: {}\n\n";

/// pump 与响应体之间的缓冲块数
const CHANNEL_CAPACITY: usize = 16;

/// 流的结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// 上游正常结束
    Completed,
    /// 读取上游失败，已向客户端发出错误
    UpstreamFailed,
    /// 客户端断开
    ClientDisconnected,
}

#[derive(Debug, Default)]
struct PumpStats {
    chunks: u64,
    bytes: u64,
    pings: u64,
}

/// 发给客户端的响应体流
///
/// 持有取消 token 的 drop guard，被丢弃时通知 pump 停止。
pub struct RelayBody {
    rx: mpsc::Receiver<Result<Bytes, io::Error>>,
    _cancel: DropGuard,
}

impl Stream for RelayBody {
    type Item = Result<Bytes, io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// 启动 pump 任务，返回响应体流和任务句柄
pub fn relay_stream<S, E>(upstream: S, keep_alive: Duration) -> (RelayBody, JoinHandle<StreamOutcome>)
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(
        pump(upstream, tx, keep_alive, cancel.clone()).instrument(tracing::Span::current()),
    );
    let body = RelayBody {
        rx,
        _cancel: cancel.drop_guard(),
    };
    (body, task)
}

async fn pump<S, E>(
    upstream: S,
    tx: mpsc::Sender<Result<Bytes, io::Error>>,
    keep_alive: Duration,
    cancel: CancellationToken,
) -> StreamOutcome
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let start = Instant::now();
    let mut upstream = pin!(upstream);
    // 第一次 ping 在流开始一个间隔之后
    let mut ping_interval = interval_at(start + keep_alive, keep_alive);
    ping_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut stats = PumpStats::default();

    let outcome = loop {
        tokio::select! {
            // 优先检查取消，其次 ping，避免上游 chunk 密集时 ping 被饿死
            biased;

            _ = cancel.cancelled() => break StreamOutcome::ClientDisconnected,

            _ = ping_interval.tick() => {
                tracing::trace!("发送 ping 保活事件");
                if tx.send(Ok(Bytes::from_static(PING_FRAME))).await.is_err() {
                    break StreamOutcome::ClientDisconnected;
                }
                stats.pings += 1;
            }

            chunk = upstream.next() => match chunk {
                Some(Ok(bytes)) => {
                    let len = bytes.len() as u64;
                    if tx.send(Ok(bytes)).await.is_err() {
                        break StreamOutcome::ClientDisconnected;
                    }
                    stats.chunks += 1;
                    stats.bytes += len;
                }
                Some(Err(e)) => {
                    let message = format!("upstream stream error: {}", e);
                    tracing::error!("读取上游流失败: {}", e);
                    let _ = tx.send(Err(io::Error::other(message))).await;
                    break StreamOutcome::UpstreamFailed;
                }
                None => break StreamOutcome::Completed,
            },
        }
    };

    tracing::info!(
        outcome = ?outcome,
        chunks = stats.chunks,
        bytes = stats.bytes,
        pings = stats.pings,
        duration_ms = start.elapsed().as_millis() as u64,
        "中继流结束"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    const KEEP_ALIVE: Duration = Duration::from_secs(20);

    fn ok_chunks(chunks: &[&'static str]) -> impl Stream<Item = Result<Bytes, io::Error>> + Send {
        stream::iter(
            chunks
                .iter()
                .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    async fn collect(body: RelayBody) -> Vec<Result<Bytes, io::Error>> {
        body.collect().await
    }

    /// 上游流被丢弃时置位
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_chunks_are_forwarded_in_order() {
        let (body, task) = relay_stream(ok_chunks(&["data: b1\n\n", "data: b2\n\n", "data: b3\n\n"]), KEEP_ALIVE);

        let items: Vec<Bytes> = collect(body).await.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(
            items,
            vec![
                Bytes::from_static(b"data: b1\n\n"),
                Bytes::from_static(b"data: b2\n\n"),
                Bytes::from_static(b"data: b3\n\n"),
            ]
        );
        assert_eq!(task.await.unwrap(), StreamOutcome::Completed);
    }

    #[tokio::test]
    async fn test_partial_frames_are_not_reframed() {
        let (body, _task) = relay_stream(ok_chunks(&["data: hel", "lo\n", "\n"]), KEEP_ALIVE);

        let items: Vec<Bytes> = collect(body).await.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(items.len(), 3);
        assert_eq!(items.concat(), b"data: hello\n\n".to_vec());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_sent_during_silence() {
        let upstream = stream::unfold(0u8, |step| async move {
            match step {
                0 => Some((Ok::<_, io::Error>(Bytes::from_static(b"data: first\n\n")), 1)),
                1 => {
                    tokio::time::sleep(Duration::from_secs(45)).await;
                    Some((Ok(Bytes::from_static(b"data: second\n\n")), 2))
                }
                _ => None,
            }
        });
        let (body, task) = relay_stream(upstream, KEEP_ALIVE);

        let items: Vec<Bytes> = collect(body).await.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(
            items,
            vec![
                Bytes::from_static(b"data: first\n\n"),
                Bytes::from_static(PING_FRAME),
                Bytes::from_static(PING_FRAME),
                Bytes::from_static(b"data: second\n\n"),
            ]
        );
        assert_eq!(task.await.unwrap(), StreamOutcome::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_ping_before_interval_elapses() {
        let upstream = stream::unfold(false, |done| async move {
            if done {
                return None;
            }
            tokio::time::sleep(Duration::from_secs(19)).await;
            Some((Ok::<_, io::Error>(Bytes::from_static(b"data: x\n\n")), true))
        });
        let (body, _task) = relay_stream(upstream, KEEP_ALIVE);

        let items: Vec<Bytes> = collect(body).await.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(items, vec![Bytes::from_static(b"data: x\n\n")]);
    }

    #[tokio::test]
    async fn test_upstream_error_is_propagated() {
        let upstream = stream::iter(vec![
            Ok(Bytes::from_static(b"data: partial\n\n")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer")),
            Ok(Bytes::from_static(b"data: never\n\n")),
        ]);
        let (body, task) = relay_stream(upstream, KEEP_ALIVE);

        let items = collect(body).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &Bytes::from_static(b"data: partial\n\n"));
        assert!(items[1].is_err());
        assert_eq!(task.await.unwrap(), StreamOutcome::UpstreamFailed);
    }

    #[tokio::test]
    async fn test_client_disconnect_releases_upstream() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = DropFlag(released.clone());
        // 先产出一个块，然后永远挂起
        let upstream = stream::once(async { Ok::<_, io::Error>(Bytes::from_static(b"data: hi\n\n")) })
            .chain(stream::pending())
            .map(move |item| {
                let _keep = &flag;
                item
            });

        let (mut body, task) = relay_stream(upstream, KEEP_ALIVE);
        let first = body.next().await.unwrap().unwrap();
        assert_eq!(first, Bytes::from_static(b"data: hi\n\n"));

        drop(body);

        let outcome = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("pump did not stop after client disconnect")
            .unwrap();
        assert_eq!(outcome, StreamOutcome::ClientDisconnected);
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_invocations_are_independent() {
        let (body_a, task_a) = relay_stream(ok_chunks(&["a1", "a2"]), KEEP_ALIVE);
        let (body_b, task_b) = relay_stream(stream::pending::<Result<Bytes, io::Error>>(), KEEP_ALIVE);

        drop(body_b);
        let items: Vec<Bytes> = collect(body_a).await.into_iter().map(|r| r.unwrap()).collect();

        assert_eq!(items, vec![Bytes::from_static(b"a1"), Bytes::from_static(b"a2")]);
        assert_eq!(task_a.await.unwrap(), StreamOutcome::Completed);
        assert_eq!(task_b.await.unwrap(), StreamOutcome::ClientDisconnected);
    }
}
