use crate::context::Context;
use crate::proto::AtRecord;
use crate::store::Apply;

/// Where an update entered this member: from a locally connected
/// client, or relayed by a peer (tagged with the AT line's origin
/// server, so an update is never echoed straight back toward where it
/// was first accepted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Local,
    Peer(String),
}

/// Offer an update to the store and, when it is novel, hand its raw AT
/// line to every neighbor link except the source. The fan-out runs
/// under the store's per-client entry, so concurrent applies for one
/// client never interleave. A stale update stops here — that is the
/// loop breaker that bounds flood traffic to one AT per directed edge.
pub fn apply(ctx: &Context, record: AtRecord, source: &Source) -> Apply {
    let exclude = match source {
        Source::Local => None,
        Source::Peer(name) => Some(name.as_str()),
    };
    ctx.store.apply_with(record, |stored| {
        ctx.links.fan_out(&stored.raw_line, exclude, &ctx.metrics);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::proto::{Coords, Stamp};

    fn test_ctx() -> std::sync::Arc<Context> {
        let config = Config::from_str(
            r#"
servers:
  Bailey: 1
  Clark: 2
  Jaquez: 3
neighbors:
  Bailey: [Clark, Jaquez]
  Clark: [Bailey]
  Jaquez: [Bailey]
"#,
        )
        .unwrap();
        Context::new(&config, "Bailey").unwrap()
    }

    fn record(client: &str, ts: &str) -> AtRecord {
        AtRecord::compose(
            "Bailey",
            "+0.000000001".to_string(),
            client,
            Coords::parse("+1.0-2.0").unwrap(),
            Stamp::parse(ts).unwrap(),
        )
    }

    #[test]
    fn local_update_reaches_every_neighbor() {
        let ctx = test_ctx();
        assert_eq!(apply(&ctx, record("kiwi", "1000.0"), &Source::Local), Apply::Applied);
        assert_eq!(ctx.links.get("Clark").unwrap().queue.len(), 1);
        assert_eq!(ctx.links.get("Jaquez").unwrap().queue.len(), 1);
        assert_eq!(ctx.metrics.flood_enqueued_total(), 2);
    }

    #[test]
    fn relayed_update_skips_its_source() {
        let ctx = test_ctx();
        let rec = record("kiwi", "1000.0");
        let source = Source::Peer("Clark".to_string());
        assert_eq!(apply(&ctx, rec, &source), Apply::Applied);
        assert!(ctx.links.get("Clark").unwrap().queue.is_empty());
        assert_eq!(ctx.links.get("Jaquez").unwrap().queue.len(), 1);
    }

    #[test]
    fn stale_update_does_not_propagate() {
        let ctx = test_ctx();
        apply(&ctx, record("kiwi", "2000.0"), &Source::Local);
        let before = ctx.metrics.flood_enqueued_total();
        assert_eq!(apply(&ctx, record("kiwi", "1000.0"), &Source::Local), Apply::Ignored);
        assert_eq!(apply(&ctx, record("kiwi", "2000.0"), &Source::Local), Apply::Ignored);
        assert_eq!(ctx.metrics.flood_enqueued_total(), before);
    }
}
