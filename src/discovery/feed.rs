use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use super::Episode;

/// Parse an RSS channel document into the episodes it lists.
///
/// The channel title becomes each episode's `podcast` field. Items without
/// an audio enclosure cannot be processed and are skipped.
pub fn parse_feed(content: &str) -> Result<Vec<Episode>> {
    let channel = content
        .parse::<rss::Channel>()
        .context("failed to parse RSS feed")?;

    let podcast = channel.title().to_string();
    let mut episodes = Vec::with_capacity(channel.items().len());

    for item in channel.items() {
        let title = item.title().unwrap_or("").to_string();

        let Some(enclosure) = item.enclosure() else {
            tracing::debug!(title = %title, "skipping feed item without enclosure");
            continue;
        };

        // prefer guid, fall back to link, then title
        let guid = item
            .guid()
            .map(|g| g.value().to_string())
            .or_else(|| item.link().map(|l| l.to_string()))
            .unwrap_or_else(|| title.clone());

        let published = item.pub_date().and_then(parse_pub_date);

        let duration_secs = item
            .itunes_ext()
            .and_then(|ext| ext.duration())
            .and_then(parse_duration);

        episodes.push(Episode {
            guid,
            podcast: podcast.clone(),
            title,
            audio_url: enclosure.url().to_string(),
            published,
            description: item.description().map(|d| d.to_string()),
            duration_secs,
        });
    }

    Ok(episodes)
}

fn parse_pub_date(date: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(date)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Accepts the itunes duration spellings: plain seconds, `MM:SS`, `HH:MM:SS`.
fn parse_duration(duration: &str) -> Option<u64> {
    let parts: Vec<&str> = duration.trim().split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let mut total = 0u64;
    for part in &parts {
        total = total * 60 + part.parse::<u64>().ok()?;
    }
    Some(total)
}
