//! Human-readable rendering of headers, AVPs and messages.
//!
//! `Avp`'s own `Display` impl (see `avp::mod`) can't resolve a code to a
//! name because it has no dictionary to consult; this module is the
//! "display layer" that placeholder comment refers to — it pairs a
//! message or AVP with a [`Dictionary`] to print names instead of bare
//! codes, the way a diagnostic dump or `dump peers`-style admin command
//! would.

use crate::avp::Avp;
use crate::diameter::{CommandFlags, DiameterHeader, DiameterMessage};
use crate::dictionary::Dictionary;
use std::fmt;

impl fmt::Display for DiameterHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_flags(f, self.flags)?;
        write!(
            f,
            " code={} app={} hbh={} e2e={} len={}",
            self.code, self.application_id, self.hop_by_hop_id, self.end_to_end_id, self.length
        )
    }
}

fn write_flags(f: &mut fmt::Formatter<'_>, flags: CommandFlags) -> fmt::Result {
    write!(
        f,
        "{}{}{}{}",
        if flags.request { "R" } else { "-" },
        if flags.proxyable { "P" } else { "-" },
        if flags.error { "E" } else { "-" },
        if flags.retransmit { "T" } else { "-" },
    )
}

/// Renders one AVP, resolving its code/enum value to names via `dict`
/// when known, falling back to the bare code otherwise.
pub fn format_avp(avp: &Avp, dict: &Dictionary) -> String {
    let name = dict.avp_name(avp.code(), avp.vendor_id()).unwrap_or_else(|| format!("AVP-{}", avp.code()));
    let vendor = avp.vendor_id().map(|v| v.to_string()).unwrap_or_default();
    format!(
        "{:<32} vendor={:<8} code={:<5} V={} M={} P={} type={:<16} value={}",
        name,
        vendor,
        avp.code(),
        avp.flags().vendor as u8,
        avp.flags().mandatory as u8,
        avp.flags().private as u8,
        avp.value().type_name(),
        avp.value()
    )
}

/// Renders a full message: header line followed by one line per AVP.
pub fn format_message(msg: &DiameterMessage, dict: &Dictionary) -> String {
    let mut out = format!("{}\n", msg.header);
    for avp in &msg.avps {
        out.push_str("  ");
        out.push_str(&format_avp(avp, dict));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avp::Avp;
    use crate::diameter::CommandFlags;

    #[test]
    fn test_format_message_resolves_known_avp_name() {
        let dict = Dictionary::new_default();
        let mut msg = DiameterMessage::new(257, 0, CommandFlags::request(), 1, 1);
        msg.add_avp(Avp::new_identity(264, None, true, "host.example.net"));

        let rendered = format_message(&msg, &dict);
        assert!(rendered.contains("Origin-Host"));
        assert!(rendered.contains("host.example.net"));
    }

    #[test]
    fn test_format_avp_falls_back_to_code_for_unknown_avp() {
        let dict = Dictionary::new_default();
        let avp = Avp::new_unsigned32(99999, None, true, 7);
        let rendered = format_avp(&avp, &dict);
        assert!(rendered.contains("AVP-99999"));
    }
}
