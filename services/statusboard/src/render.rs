//! Status document rendering.

use chat_api::{Embed, EmbedField, EmbedFooter};

use crate::config::FleetConfig;
use crate::fanout;
use crate::probe::ProbeResult;

const COLOR_SOME_ONLINE: u32 = 0x2ECC71;
const COLOR_ALL_OFFLINE: u32 = 0xE74C3C;

/// Compose the single embed the publisher maintains in the channel: one
/// field per category in `category_order`, one line per server.
pub fn status_embed(cfg: &FleetConfig, results: &[ProbeResult]) -> Embed {
    let online = results.iter().filter(|r| r.is_online()).count();
    let fields = fanout::group_by_category(cfg, results)
        .into_iter()
        .map(|group| EmbedField {
            name: format!("{} {}", group.emoji, group.name).trim().to_owned(),
            value: if group.results.is_empty() {
                "_no servers configured_".to_owned()
            } else {
                group
                    .results
                    .iter()
                    .map(|r| server_line(r))
                    .collect::<Vec<_>>()
                    .join("\n")
            },
            inline: false,
        })
        .collect();

    Embed {
        title: "Server fleet status".to_owned(),
        description: Some(format!("{} of {} servers online", online, results.len())),
        color: if online > 0 {
            COLOR_SOME_ONLINE
        } else {
            COLOR_ALL_OFFLINE
        },
        fields,
        footer: Some(EmbedFooter {
            text: cfg.server_ip.clone(),
        }),
        timestamp: Some(chrono::Utc::now().to_rfc3339()),
    }
}

fn server_line(result: &ProbeResult) -> String {
    if result.is_online() {
        format!(
            "🟢 **{}** · {} · {}",
            result.name, result.map_label, result.players_text
        )
    } else {
        format!("🔴 **{}** · Offline", result.name)
    }
}
