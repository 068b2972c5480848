use crate::context::Context;
use crate::flood::{self, Source};
use crate::proto::{self, AtRecord, Command, Coords, Stamp};
use crate::utils::misc::get_unix_nanos_now;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Drive one accepted connection: read LF-terminated lines, answer in
/// order, and keep going until the peer closes, the line stream breaks,
/// or shutdown is signaled. Peer-originated connections run through
/// here too; their AT lines simply produce no reply.
pub async fn run_session(ctx: Arc<Context>, stream: TcpStream, mut shutdown: watch::Receiver<bool>) {
    let peer = stream.peer_addr().map(|a| a.to_string()).unwrap_or_else(|_| "unknown".to_string());
    debug!(%peer, "connection opened");
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    loop {
        line.clear();
        let read = tokio::select! {
            _ = shutdown.changed() => break,
            r = reader.read_line(&mut line) => r,
        };
        match read {
            Ok(0) => break,
            Ok(n) => {
                ctx.metrics.add_line(n);
                let trimmed = line.strip_suffix('\n').unwrap_or(&line);
                let trimmed = trimmed.strip_suffix('\r').unwrap_or(trimmed);
                if trimmed.split_ascii_whitespace().next().is_none() {
                    continue;
                }
                if let Some(reply) = dispatch(&ctx, trimmed).await {
                    if let Err(e) = write_half.write_all(reply.as_bytes()).await {
                        debug!(%peer, "write failed: {}", e);
                        break;
                    }
                }
            }
            Err(e) => {
                debug!(%peer, "read failed: {}", e);
                break;
            }
        }
    }
    debug!(%peer, "connection closed");
}

/// Parse and execute one line, returning the bytes to write back (None
/// for AT lines, which are never answered).
pub async fn dispatch(ctx: &Context, line: &str) -> Option<String> {
    match Command::parse(line) {
        Ok(Command::Iamat { client_id, coords, stamp }) => Some(handle_iamat(ctx, &client_id, coords, stamp)),
        Ok(Command::Whatsat { client_id, radius_km, max_results }) => {
            Some(handle_whatsat(ctx, line, &client_id, radius_km, max_results).await)
        }
        Ok(Command::At(record)) => {
            ctx.metrics.add_handled_cmd("AT");
            let source = Source::Peer(record.origin_server.clone());
            flood::apply(ctx, record, &source);
            None
        }
        Err(e) => {
            ctx.metrics.add_error(&e);
            Some(invalid(line))
        }
    }
}

/// Accept a position report: stamp it with this member's receive-time
/// skew, flood when novel, and echo the AT line either way. The reply
/// only waits for queue handoff, never for any peer.
fn handle_iamat(ctx: &Context, client_id: &str, coords: Coords, stamp: Stamp) -> String {
    ctx.metrics.add_handled_cmd("IAMAT");
    let skew = proto::render_skew(get_unix_nanos_now() as i128 - stamp.nanos);
    let record = AtRecord::compose(&ctx.member.name, skew, client_id, coords, stamp);
    let reply = format!("{}\n", record.raw_line);
    info!(client = client_id, "accepted {}", record.raw_line);
    flood::apply(ctx, record, &Source::Local);
    reply
}

/// Enrich a stored position with nearby places. The stored AT line is
/// echoed byte-exact; the JSON body (or `{}` on any lookup failure)
/// follows, and the whole reply ends in exactly two LFs. No store or
/// link lock is held across the HTTP await — the record is a snapshot.
async fn handle_whatsat(ctx: &Context, line: &str, client_id: &str, radius_km: f64, max_results: usize) -> String {
    ctx.metrics.add_handled_cmd("WHATSAT");
    let record = match ctx.store.get(client_id) {
        Some(record) => record,
        None => return invalid(line),
    };
    let lookup = ctx
        .places
        .lookup(record.coords.lat, record.coords.lon, radius_km, max_results, ctx.member.whatsat_timeout)
        .await;
    match lookup {
        Ok(body) => format!("{}\n{}\n\n", record.raw_line, body.trim_end()),
        Err(e) => {
            warn!(client = client_id, "places lookup failed: {}", e);
            ctx.metrics.add_error(&e);
            format!("{}\n{{}}\n\n", record.raw_line)
        }
    }
}

fn invalid(line: &str) -> String {
    format!("? {}\n", line)
}
