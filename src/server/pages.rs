//! HTML rendering for the booking desk and admin view.

use std::fmt::Write;

use crate::registry::{Occupancy, Slot};

/// One-shot message carried in the redirect query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flash {
    None,
    Booked { booking_id: String, slot: String },
    Error { kind: String, slot: String },
}

const STYLE: &str = "body{font-family:sans-serif;margin:2rem}\
table{border-collapse:collapse}td,th{border:1px solid #ccc;padding:.4rem .8rem}\
.free{color:#15803d}.booked{color:#b91c1c}.flash{padding:.6rem;margin:1rem 0;border-radius:4px}\
.ok{background:#dcfce7}.err{background:#fee2e2}";

/// Minimal HTML escaping for text and attribute values.
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{title}</title>\
<style>{STYLE}</style></head><body>\n<h1>{title}</h1>\n{body}</body></html>\n",
        title = escape(title),
    )
}

fn flash_message(kind: &str, slot: &str) -> String {
    let slot = escape(slot);
    match kind {
        "already_booked" => format!("Slot {} is already booked.", slot),
        "not_booked" => format!("Slot {} is not booked.", slot),
        "slot_not_found" => format!("Slot {} does not exist.", slot),
        other => format!("Request for slot {} failed ({}).", slot, escape(other)),
    }
}

pub fn render_home(slots: &[Slot], flash: &Flash) -> String {
    let mut body = String::new();
    match flash {
        Flash::None => {}
        Flash::Booked { booking_id, slot } => {
            let id = escape(booking_id);
            let _ = write!(
                body,
                "<div class=\"flash ok\">Booked slot {} with booking ID <code>{}</code>. \
<a href=\"/qr/{}\">Ticket</a></div>\n",
                escape(slot),
                id,
                id
            );
        }
        Flash::Error { kind, slot } => {
            let _ = write!(
                body,
                "<div class=\"flash err\">{}</div>\n",
                flash_message(kind, slot)
            );
        }
    }

    body.push_str("<table>\n<tr><th>Slot</th><th>Status</th><th>Booking ID</th><th></th></tr>\n");
    for slot in slots {
        let id = escape(slot.slot_id.as_str());
        match &slot.booking_id {
            None => {
                let _ = writeln!(
                    body,
                    "<tr><td>{id}</td><td class=\"free\">Free</td><td></td>\
<td><a href=\"/book/{id}\">Book</a></td></tr>"
                );
            }
            Some(booking) => {
                let _ = writeln!(
                    body,
                    "<tr><td>{id}</td><td class=\"booked\">Booked</td><td><code>{}</code></td>\
<td><a href=\"/release/{id}\">Release</a></td></tr>",
                    escape(booking.as_str())
                );
            }
        }
    }
    body.push_str("</table>\n<p><a href=\"/admin\">Admin dashboard</a></p>\n");
    page("Campus Parking", &body)
}

pub fn render_admin(slots: &[Slot], occupancy: &Occupancy) -> String {
    let mut body = String::new();
    let _ = write!(
        body,
        "<p>Parking spaces: <strong>{}</strong> &middot; Active bookings: <strong>{}</strong> \
&middot; Free: <strong>{}</strong></p>\n",
        occupancy.total, occupancy.booked, occupancy.free
    );
    body.push_str("<table>\n<tr><th>Slot</th><th>Status</th><th>Booking ID</th><th>Ticket</th></tr>\n");
    for slot in slots {
        let id = escape(slot.slot_id.as_str());
        match &slot.booking_id {
            None => {
                let _ = writeln!(
                    body,
                    "<tr><td>{id}</td><td class=\"free\">Free</td><td></td><td></td></tr>"
                );
            }
            Some(booking) => {
                let token = escape(booking.as_str());
                let _ = writeln!(
                    body,
                    "<tr><td>{id}</td><td class=\"booked\">Booked</td><td><code>{token}</code></td>\
<td><a href=\"/qr/{token}\">QR</a> &middot; <a href=\"/release/{id}\">Release</a></td></tr>"
                );
            }
        }
    }
    body.push_str("</table>\n<p><a href=\"/\">Back to booking</a></p>\n");
    page("Parking Admin", &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{BookingId, SlotId};

    fn slots() -> Vec<Slot> {
        vec![
            Slot {
                slot_id: SlotId::new("A1").unwrap(),
                booking_id: Some(BookingId::from_raw("abcd1234")),
            },
            Slot {
                slot_id: SlotId::new("A2").unwrap(),
                booking_id: None,
            },
        ]
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("<a href='x'>&</a>"), "&lt;a href=&#39;x&#39;&gt;&amp;&lt;/a&gt;");
    }

    #[test]
    fn test_home_links() {
        let html = render_home(&slots(), &Flash::None);
        assert!(html.contains("href=\"/release/A1\""));
        assert!(html.contains("href=\"/book/A2\""));
        assert!(html.contains("abcd1234"));
    }

    #[test]
    fn test_home_flash_is_escaped() {
        let flash = Flash::Error {
            kind: "<script>".into(),
            slot: "A1".into(),
        };
        let html = render_home(&slots(), &flash);
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_admin_summary() {
        let slots = slots();
        let html = render_admin(&slots, &Occupancy::of(&slots));
        assert!(html.contains("Parking spaces: <strong>2</strong>"));
        assert!(html.contains("Active bookings: <strong>1</strong>"));
        assert!(html.contains("href=\"/qr/abcd1234\""));
    }
}
