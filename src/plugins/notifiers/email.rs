use async_trait::async_trait;
use lettre::message::{header, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use metrics::counter;
use std::time::Duration;

use crate::config::SmtpConfig;
use crate::models::ItemKind;
use crate::plugins::traits::{Notification, NotificationItem, Notifier};
use crate::utils::error::AppError;
use crate::Result;

pub struct EmailNotifier {
    from: Mailbox,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let address = config
            .from_address
            .clone()
            .or_else(|| config.username.clone())
            .ok_or_else(|| {
                AppError::Configuration("notifications.smtp.from_address is not set".into())
            })?;
        let from = Mailbox::new(Some(config.from_name.clone()), address.parse()?);

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        }
        .port(config.port)
        .timeout(Some(Duration::from_secs(config.timeout)));

        let mailer = match (&config.username, &config.password) {
            (Some(username), Some(password)) => builder
                .credentials(Credentials::new(username.clone(), password.clone()))
                .build(),
            _ => builder.build(),
        };

        Ok(Self { from, mailer })
    }

    fn build_message(&self, notification: &Notification) -> Result<Message> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(notification.recipient.parse()?)
            .subject(notification.subject.clone())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(format_text_body(notification)),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(format_html_body(notification)),
                    ),
            )?;
        Ok(message)
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    async fn notify(&self, notification: &Notification) -> Result<()> {
        let message = self.build_message(notification)?;
        self.mailer.send(message).await?;

        counter!("notifications_sent_total").increment(1);
        tracing::info!(
            recipient = %notification.recipient,
            items = notification.items.len(),
            "Email sent: {}",
            notification.subject
        );
        Ok(())
    }
}

pub(crate) fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

fn kind_badge(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::New => "background:#e8f5e8;color:#2e7d32;",
        ItemKind::Relisted => "background:#fff3cd;color:#8a6d00;",
    }
}

fn format_card(item: &NotificationItem) -> String {
    let mut card = String::from(
        r#"<div style="border:1px solid #eee;border-radius:10px;padding:12px;margin:12px 0;">"#,
    );

    if let Some(image) = &item.image_url {
        card.push_str(&format!(
            r#"<div style="background:#f5f5f5;border-radius:8px;height:210px;text-align:center;overflow:hidden;"><img src="{}" alt="" style="width:100%;height:210px;object-fit:contain;" /></div>"#,
            escape_html(image)
        ));
    }

    card.push_str(&format!(
        r#"<div style="margin-top:10px;"><span style="font-size:11px;font-weight:700;padding:2px 6px;border-radius:4px;{}">{}</span> <span style="font-size:12px;color:#666;">{}</span></div>"#,
        kind_badge(item.kind),
        item.kind.label(),
        escape_html(&item.category)
    ));
    card.push_str(&format!(
        r#"<div style="margin-top:6px;font-size:18px;font-weight:700;">{}</div>"#,
        escape_html(&item.title)
    ));
    card.push_str(&format!(
        r#"<div style="margin-top:6px;font-size:16px;font-weight:700;">{}</div>"#,
        escape_html(&item.price_text)
    ));

    if let Some(link) = &item.item_url {
        card.push_str(&format!(
            r#"<a href="{}" style="display:inline-block;margin-top:10px;color:#0058a3;text-decoration:none;font-weight:600;">View listing</a>"#,
            escape_html(link)
        ));
    }

    card.push_str("</div>");
    card
}

pub(crate) fn format_html_body(notification: &Notification) -> String {
    let cards: String = notification.items.iter().map(format_card).collect();

    format!(
        r#"<!DOCTYPE html>
<html>
<body>
<div style="font-family: Arial, sans-serif; background:#ffffff; padding:16px; max-width:640px; margin:0 auto; color:#111;">
  <div style="font-size:13px;color:#666;">{}</div>
  {}
</div>
</body>
</html>
"#,
        escape_html(&notification.mode_label),
        cards
    )
}

pub(crate) fn format_text_body(notification: &Notification) -> String {
    let mut text = String::new();

    text.push_str(&format!("{}\n\n", notification.mode_label));
    for item in &notification.items {
        text.push_str(&format!("[{}] {} - {}\n", item.kind.label(), item.title, item.price_text));
        text.push_str(&format!("Category: {}\n", item.category));
        if let Some(link) = &item.item_url {
            text.push_str(&format!("Link: {}\n", link));
        }
        text.push('\n');
    }

    text
}
