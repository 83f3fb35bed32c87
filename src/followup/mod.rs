pub mod interval;
pub mod quote;
pub mod scheduler;
pub mod selector;
pub mod sequence;

/// Strip leading `Re:`/`Fw:`/`Fwd:` markers (stacked, any case) from a
/// subject line.
pub fn strip_reply_prefixes(subject: &str) -> &str {
    let mut rest = subject.trim();
    loop {
        let lower = rest.to_ascii_lowercase();
        let stripped = ["re:", "fwd:", "fw:"]
            .iter()
            .find(|p| lower.starts_with(**p))
            .map(|p| rest[p.len()..].trim_start());
        match stripped {
            Some(next) => rest = next,
            None => return rest,
        }
    }
}
