use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::config::ScanOptions;
use crate::services::service_name;
use crate::types::PortDetail;

/// Probe a single port: bounded TCP connect, then one passive banner read.
///
/// - `addrs` are the target's resolved addresses. They are dialed in order and
///   the first that accepts wins; `connect_timeout` bounds the whole sequence.
/// - Refused, unreachable, timed out and unresolved (empty `addrs`) all
///   collapse to `None`.
/// - A connected port always yields a `PortDetail`, with an empty banner when
///   the service sent nothing within `read_timeout`.
/// - The stream is owned here and dropped before returning, so the socket is
///   closed on every path.
/// - Cancellation is observed during both the connect and the read; a
///   cancelled probe yields `None`.
pub async fn probe(
    addrs: &[IpAddr],
    port: u16,
    options: &ScanOptions,
    cancel: &CancellationToken,
) -> Option<PortDetail> {
    let sockets: Vec<SocketAddr> = addrs.iter().map(|ip| SocketAddr::new(*ip, port)).collect();

    let start = Instant::now();
    let connect = time::timeout(options.connect_timeout, TcpStream::connect(&sockets[..]));
    let connect_res = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            trace!(port, "probe cancelled while connecting");
            return None;
        }
        res = connect => res,
    };
    let response_ms = start.elapsed().as_millis() as u64;

    let mut stream = match connect_res {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            trace!(port, error = %e, "connect failed");
            return None;
        }
        Err(_) => {
            trace!(port, "connect timed out");
            return None;
        }
    };

    let banner = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            trace!(port, "probe cancelled while reading banner");
            return None;
        }
        banner = read_banner(&mut stream, options.read_timeout, options.effective_banner_size()) => banner,
    };
    let peer = stream.peer_addr().ok();
    drop(stream);

    trace!(port, ?peer, response_ms, banner_len = banner.len(), "port open");
    Some(PortDetail {
        port,
        service: service_name(port).to_string(),
        response_ms,
        banner,
    })
}

/// Single read of up to `size` bytes, lossily decoded. Empty on timeout, EOF or error.
async fn read_banner(stream: &mut TcpStream, timeout: Duration, size: usize) -> String {
    let mut buf = vec![0u8; size];
    match time::timeout(timeout, stream.read(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => {
            buf.truncate(n);
            String::from_utf8_lossy(&buf).into_owned()
        }
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    const LOOPBACK: &[IpAddr] = &[IpAddr::V4(std::net::Ipv4Addr::LOCALHOST)];

    fn fast_options() -> ScanOptions {
        ScanOptions::new()
            .connect_timeout(Duration::from_millis(500))
            .read_timeout(Duration::from_millis(200))
    }

    async fn greeting_listener(greeting: &'static [u8]) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                let _ = sock.write_all(greeting).await;
            }
        });
        port
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn captures_banner() {
        let port = greeting_listener(b"SSH-2.0-OpenSSH_9.6\r\n").await;
        let detail = probe(LOOPBACK, port, &fast_options(), &CancellationToken::new())
            .await
            .expect("port should be open");
        assert_eq!(detail.port, port);
        assert_eq!(detail.banner, "SSH-2.0-OpenSSH_9.6\r\n");
    }

    #[tokio::test]
    async fn silent_service_yields_empty_banner() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((sock, _)) = listener.accept().await {
                held.push(sock);
            }
        });
        let started = Instant::now();
        let detail = probe(LOOPBACK, port, &fast_options(), &CancellationToken::new())
            .await
            .expect("port should be open");
        assert!(detail.banner.is_empty());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn banner_is_truncated_to_buffer_size() {
        let port = greeting_listener(b"0123456789abcdef").await;
        let opts = fast_options().banner_size(4);
        let detail = probe(LOOPBACK, port, &opts, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(detail.banner, "0123");
    }

    #[tokio::test]
    async fn non_utf8_banner_is_decoded_lossily() {
        let port = greeting_listener(&[0x48, 0x49, 0xff, 0xfe]).await;
        let detail = probe(LOOPBACK, port, &fast_options(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(detail.banner.starts_with("HI"));
        assert!(detail.banner.contains('\u{FFFD}'));
    }

    #[tokio::test]
    async fn closed_port_yields_none() {
        let port = closed_port().await;
        assert!(probe(LOOPBACK, port, &fast_options(), &CancellationToken::new())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn no_addresses_yields_none() {
        let res = probe(&[], 80, &fast_options(), &CancellationToken::new()).await;
        assert!(res.is_none());
    }

    #[tokio::test]
    async fn falls_through_to_later_address() {
        // Dual-stack order: ::1 first, but the listener is bound to 127.0.0.1 only.
        let port = greeting_listener(b"ready\n").await;
        let addrs: Vec<IpAddr> = vec!["::1".parse().unwrap(), "127.0.0.1".parse().unwrap()];
        let detail = probe(&addrs, port, &fast_options(), &CancellationToken::new())
            .await
            .expect("second address accepts");
        assert_eq!(detail.port, port);
        assert_eq!(detail.banner, "ready\n");
    }

    #[tokio::test]
    async fn cancelled_probe_yields_none() {
        let port = greeting_listener(b"hello").await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(probe(LOOPBACK, port, &fast_options(), &cancel).await.is_none());
    }
}
