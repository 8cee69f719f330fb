//! Transcript rendering and archival for closed tickets.
//!
//! The full channel history is fetched in reverse-chronological pages,
//! reassembled into chronological order, and rendered as a single
//! self-contained HTML document. Message content is escaped against markup
//! injection; non-text messages get bracketed placeholders.

use poise::serenity_prelude as serenity;
use poise::serenity_prelude::{ChannelId, Http};
use tracing::info;

use crate::error::Result;

const PAGE_SIZE: u8 = 100;

/// One rendered line of a transcript.
#[derive(Debug, Clone)]
pub struct TranscriptMessage {
    pub author: String,
    pub timestamp_secs: i64,
    pub body: MessageBody,
}

/// What a message contained, after collapsing non-text payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    /// Embed-only message; carries the first embed's title if any.
    Embed(Option<String>),
    /// Attachment-only message.
    Attachment,
    Empty,
}

impl MessageBody {
    fn render(&self) -> String {
        match self {
            MessageBody::Text(content) => escape_html(content),
            MessageBody::Embed(Some(title)) => format!("[embed: {}]", escape_html(title)),
            MessageBody::Embed(None) => "[embed]".to_string(),
            MessageBody::Attachment => "[attachment]".to_string(),
            MessageBody::Empty => "[empty]".to_string(),
        }
    }
}

/// Escape the three characters that would break the rendered record.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn classify(msg: &serenity::Message) -> MessageBody {
    if !msg.content.is_empty() {
        MessageBody::Text(msg.content.clone())
    } else if !msg.embeds.is_empty() {
        MessageBody::Embed(msg.embeds[0].title.clone())
    } else if !msg.attachments.is_empty() {
        MessageBody::Attachment
    } else {
        MessageBody::Empty
    }
}

/// Render the archival document: a header identifying the ticket and the
/// close reason, followed by the chronological message list.
pub fn render_transcript(
    channel_name: &str,
    guild_name: &str,
    reason: &str,
    messages: &[TranscriptMessage],
) -> String {
    let mut doc = String::new();
    doc.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    doc.push_str(&format!(
        "<title>Transcript #{}</title>\n</head>\n<body>\n",
        escape_html(channel_name)
    ));
    doc.push_str(&format!("<h2>Ticket #{}</h2>\n", escape_html(channel_name)));
    doc.push_str(&format!(
        "<p>Server: {}<br>Closed: {}<br>Messages: {}</p>\n<hr>\n<pre>\n",
        escape_html(guild_name),
        escape_html(reason),
        messages.len()
    ));

    for msg in messages {
        let when = chrono::DateTime::<chrono::Utc>::from_timestamp(msg.timestamp_secs, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "????-??-?? ??:??:??".to_string());
        doc.push_str(&format!(
            "[{}] {}: {}\n",
            when,
            escape_html(&msg.author),
            msg.body.render()
        ));
    }

    doc.push_str("</pre>\n</body>\n</html>\n");
    doc
}

/// Fetch the entire history of `channel_id`, oldest first.
pub async fn fetch_history(http: &Http, channel_id: ChannelId) -> Result<Vec<TranscriptMessage>> {
    let mut pages: Vec<serenity::Message> = Vec::new();
    let mut before: Option<serenity::MessageId> = None;

    loop {
        let mut request = serenity::GetMessages::new().limit(PAGE_SIZE);
        if let Some(cursor) = before {
            request = request.before(cursor);
        }
        let page = channel_id.messages(http, request).await?;
        let page_len = page.len();
        before = page.last().map(|msg| msg.id);
        pages.extend(page);
        if page_len < PAGE_SIZE as usize {
            break;
        }
    }

    // Pages arrive newest-first; flip to chronological order.
    pages.reverse();

    Ok(pages
        .iter()
        .map(|msg| TranscriptMessage {
            author: msg.author.tag(),
            timestamp_secs: msg.timestamp.unix_timestamp(),
            body: classify(msg),
        })
        .collect())
}

/// Archive a closing ticket channel into the log channel.
///
/// Produces exactly one document per close. Failure to reach the sink is the
/// caller's to log; it must not block channel deletion.
pub async fn archive_channel(
    http: &Http,
    channel_id: ChannelId,
    channel_name: &str,
    guild_name: &str,
    reason: &str,
    log_channel: ChannelId,
) -> Result<()> {
    let history = fetch_history(http, channel_id).await?;
    let document = render_transcript(channel_name, guild_name, reason, &history);

    let attachment = serenity::CreateAttachment::bytes(
        document.into_bytes(),
        format!("transcript-{}.html", channel_name),
    );
    let notice = serenity::CreateMessage::new()
        .content(format!("📑 Transcript de **#{}** — {}", channel_name, reason))
        .add_file(attachment);

    log_channel.send_message(http, notice).await?;
    info!(
        "Archived transcript of #{} ({} messages)",
        channel_name,
        history.len()
    );
    Ok(())
}
