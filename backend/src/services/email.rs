use anyhow::Context;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use uuid::Uuid;

use crate::config::Config;
use crate::models::comuna;
use crate::models::profile::VerificationStatus;

const BRAND: &str = "nitoagua";

/// Transactional email, used for guest consumers (no account, no in-app
/// inbox) and for supplier verification outcomes.
pub struct EmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailService {
    /// Returns None if SMTP is not fully configured.
    pub fn new(config: &Config) -> Option<Self> {
        let host = config.smtp_host.as_deref()?;
        let username = config.smtp_username.clone()?;
        let password = config.smtp_password.clone()?;
        let from_addr = config.smtp_from.as_deref()?;

        let port = config.smtp_port.unwrap_or(587);
        let creds = Credentials::new(username, password);

        let transport = if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .ok()?
                .credentials(creds)
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .ok()?
                .port(port)
                .credentials(creds)
                .build()
        };

        let from: Mailbox = from_addr.parse().ok()?;

        Some(Self { transport, from })
    }

    // ─── Private helpers ─────────────────────────────────────────────────────

    fn new_message_id(&self) -> String {
        format!("<{}@{}>", Uuid::new_v4(), self.from.email.domain())
    }

    fn wrap_html(content: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html lang="es">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width,initial-scale=1">
  <title>{BRAND}</title>
</head>
<body style="margin:0;padding:0;background-color:#f0f9ff;font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,Helvetica,Arial,sans-serif">
  <table role="presentation" width="100%" cellpadding="0" cellspacing="0" style="background-color:#f0f9ff;padding:40px 16px">
    <tr>
      <td align="center">
        <table role="presentation" width="100%" cellpadding="0" cellspacing="0" style="max-width:520px">
          <tr>
            <td align="center" style="padding-bottom:28px">
              <p style="margin:0;font-size:22px;font-weight:800;color:#0369a1;text-align:center">{BRAND}</p>
            </td>
          </tr>
          <tr>
            <td style="background:#ffffff;border-radius:12px;padding:40px;box-shadow:0 1px 3px rgba(0,0,0,0.08)">
              {content}
            </td>
          </tr>
          <tr>
            <td align="center" style="padding-top:20px">
              <p style="margin:0;font-size:12px;color:#94a3b8">{BRAND} · Agua a domicilio</p>
            </td>
          </tr>
        </table>
      </td>
    </tr>
  </table>
</body>
</html>"#
        )
    }

    fn button(url: &str, label: &str) -> String {
        format!(
            r#"<table role="presentation" cellpadding="0" cellspacing="0" style="margin-bottom:28px">
  <tr>
    <td style="border-radius:8px;background:#0284c7">
      <a href="{url}" style="display:inline-block;padding:13px 28px;color:#ffffff;text-decoration:none;font-weight:600;font-size:15px;border-radius:8px">{label}</a>
    </td>
  </tr>
</table>"#
        )
    }

    async fn send_email(
        &self,
        to: Mailbox,
        subject: &str,
        text: &str,
        html: &str,
    ) -> anyhow::Result<()> {
        let from = Mailbox::new(Some(BRAND.to_string()), self.from.email.clone());
        let email = Message::builder()
            .message_id(Some(self.new_message_id()))
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html.to_string()),
                    ),
            )
            .context("Failed to build email message")?;

        self.transport
            .send(email)
            .await
            .context("Failed to send email")?;

        Ok(())
    }

    fn mailbox(to_email: &str, to_name: &str) -> anyhow::Result<Mailbox> {
        format!("{to_name} <{to_email}>")
            .parse::<Mailbox>()
            .or_else(|_| to_email.parse::<Mailbox>())
            .with_context(|| format!("Invalid recipient address: {to_email}"))
    }

    // ─── Public methods ───────────────────────────────────────────────────────

    pub async fn send_request_created(
        &self,
        to_email: &str,
        to_name: &str,
        amount_liters: i32,
        comuna_id: &str,
        tracking_url: &str,
    ) -> anyhow::Result<()> {
        let comuna = comuna::display_name(comuna_id);
        let subject = format!("Recibimos tu solicitud de {amount_liters} litros");
        let text = format!(
            "Hola {to_name},\n\n\
            Recibimos tu solicitud de {amount_liters} litros de agua en {comuna}.\n\
            Los aguateros de tu zona ya pueden enviarte ofertas.\n\n\
            Sigue tu pedido aquí:\n{tracking_url}\n\n\
            {BRAND}"
        );
        let content = format!(
            r#"<h1 style="margin:0 0 8px 0;font-size:22px;font-weight:700;color:#0f172a">¡Solicitud recibida!</h1>
<p style="margin:0 0 28px 0;font-size:15px;color:#64748b;line-height:1.6">Hola <strong style="color:#334155">{to_name}</strong>,<br><br>Recibimos tu solicitud de <strong>{amount_liters} litros</strong> en <strong>{comuna}</strong>. Te avisaremos cuando lleguen ofertas.</p>
{button}
<p style="margin:0;font-size:13px;color:#94a3b8;border-top:1px solid #f1f5f9;padding-top:20px;line-height:1.5">Guarda este correo: el enlace es tu acceso al pedido.</p>"#,
            button = Self::button(tracking_url, "Ver mi pedido")
        );
        let html = Self::wrap_html(&content);
        self.send_email(Self::mailbox(to_email, to_name)?, &subject, &text, &html)
            .await
    }

    pub async fn send_new_offer(
        &self,
        to_email: &str,
        to_name: &str,
        price: i32,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        tracking_url: &str,
    ) -> anyhow::Result<()> {
        let price = format_clp(price);
        let window = format_window(window_start, window_end);
        let subject = "Tienes una nueva oferta de agua".to_string();
        let text = format!(
            "Hola {to_name},\n\n\
            Un aguatero te ofreció la entrega por {price}, {window}.\n\
            Revisa y acepta la oferta antes de que expire:\n{tracking_url}\n\n\
            {BRAND}"
        );
        let content = format!(
            r#"<h1 style="margin:0 0 8px 0;font-size:22px;font-weight:700;color:#0f172a">Nueva oferta</h1>
<p style="margin:0 0 28px 0;font-size:15px;color:#64748b;line-height:1.6">Hola <strong style="color:#334155">{to_name}</strong>,<br><br>Recibiste una oferta por <strong>{price}</strong>, entrega {window}.</p>
{button}
<p style="margin:0;font-size:13px;color:#94a3b8;border-top:1px solid #f1f5f9;padding-top:20px;line-height:1.5">Las ofertas tienen un tiempo limitado de validez.</p>"#,
            button = Self::button(tracking_url, "Ver ofertas")
        );
        let html = Self::wrap_html(&content);
        self.send_email(Self::mailbox(to_email, to_name)?, &subject, &text, &html)
            .await
    }

    pub async fn send_no_offers(
        &self,
        to_email: &str,
        to_name: &str,
        tracking_url: &str,
    ) -> anyhow::Result<()> {
        let subject = "Tu solicitud no recibió ofertas".to_string();
        let text = format!(
            "Hola {to_name},\n\n\
            Lamentablemente ningún aguatero respondió a tu solicitud a tiempo.\n\
            Puedes intentarlo nuevamente desde:\n{tracking_url}\n\n\
            {BRAND}"
        );
        let content = format!(
            r#"<h1 style="margin:0 0 8px 0;font-size:22px;font-weight:700;color:#0f172a">Sin ofertas</h1>
<p style="margin:0 0 28px 0;font-size:15px;color:#64748b;line-height:1.6">Hola <strong style="color:#334155">{to_name}</strong>,<br><br>Ningún aguatero respondió a tu solicitud a tiempo. Puedes crear una nueva solicitud cuando quieras.</p>
{button}"#,
            button = Self::button(tracking_url, "Ver solicitud")
        );
        let html = Self::wrap_html(&content);
        self.send_email(Self::mailbox(to_email, to_name)?, &subject, &text, &html)
            .await
    }

    pub async fn send_delivery_completed(
        &self,
        to_email: &str,
        to_name: &str,
        amount_liters: i32,
        dispute_window_hours: i64,
        tracking_url: &str,
    ) -> anyhow::Result<()> {
        let subject = "Tu agua fue entregada".to_string();
        let text = format!(
            "Hola {to_name},\n\n\
            El aguatero marcó como entregados {amount_liters} litros.\n\
            Si hubo algún problema puedes reportarlo dentro de {dispute_window_hours} horas:\n\
            {tracking_url}\n\n\
            {BRAND}"
        );
        let content = format!(
            r#"<h1 style="margin:0 0 8px 0;font-size:22px;font-weight:700;color:#0f172a">¡Entrega completada!</h1>
<p style="margin:0 0 28px 0;font-size:15px;color:#64748b;line-height:1.6">Hola <strong style="color:#334155">{to_name}</strong>,<br><br>Se entregaron <strong>{amount_liters} litros</strong>. ¿Todo bien? Si hubo un problema, tienes <strong>{dispute_window_hours} horas</strong> para reportarlo.</p>
{button}"#,
            button = Self::button(tracking_url, "Ver entrega")
        );
        let html = Self::wrap_html(&content);
        self.send_email(Self::mailbox(to_email, to_name)?, &subject, &text, &html)
            .await
    }

    pub async fn send_verification_result(
        &self,
        to_email: &str,
        to_name: &str,
        status: VerificationStatus,
        note: Option<&str>,
        dashboard_url: &str,
    ) -> anyhow::Result<()> {
        let (subject, headline, body) = match status {
            VerificationStatus::Approved => (
                "Tu cuenta de aguatero fue aprobada",
                "¡Cuenta aprobada!",
                "Ya puedes activar tu disponibilidad y enviar ofertas.",
            ),
            VerificationStatus::Rejected => (
                "Tu solicitud de aguatero fue rechazada",
                "Solicitud rechazada",
                "Revisamos tus antecedentes y no pudimos aprobar tu cuenta.",
            ),
            VerificationStatus::MoreInfoNeeded => (
                "Necesitamos más información",
                "Faltan antecedentes",
                "Para completar tu verificación necesitamos documentos adicionales.",
            ),
            _ => (
                "Actualización de tu cuenta",
                "Estado de cuenta actualizado",
                "El estado de tu cuenta de aguatero cambió.",
            ),
        };
        let note_text = note.map(|n| format!("\n\nMotivo: {n}")).unwrap_or_default();
        let note_html = note
            .map(|n| {
                format!(
                    r#"<p style="margin:0 0 28px 0;font-size:14px;color:#334155;background:#f8fafc;border-radius:8px;padding:16px">{n}</p>"#
                )
            })
            .unwrap_or_default();

        let text = format!("Hola {to_name},\n\n{body}{note_text}\n\n{dashboard_url}\n\n{BRAND}");
        let content = format!(
            r#"<h1 style="margin:0 0 8px 0;font-size:22px;font-weight:700;color:#0f172a">{headline}</h1>
<p style="margin:0 0 20px 0;font-size:15px;color:#64748b;line-height:1.6">Hola <strong style="color:#334155">{to_name}</strong>,<br><br>{body}</p>
{note_html}
{button}"#,
            button = Self::button(dashboard_url, "Ir a mi panel")
        );
        let html = Self::wrap_html(&content);
        self.send_email(Self::mailbox(to_email, to_name)?, subject, &text, &html)
            .await
    }
}

/// Chilean peso amount: `$20.000`.
pub fn format_clp(amount: i32) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(c);
    }
    if amount < 0 {
        format!("-${out}")
    } else {
        format!("${out}")
    }
}

/// Delivery window in Chile mainland time (UTC-4 standard offset, no DST
/// handling): `entre 14:00 y 16:00 del 05/03`.
pub fn format_window(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    let tz = FixedOffset::west_opt(4 * 3600).unwrap_or(Utc.fix());
    let s = start.with_timezone(&tz);
    let e = end.with_timezone(&tz);
    format!(
        "entre {} y {} del {}",
        s.format("%H:%M"),
        e.format("%H:%M"),
        s.format("%d/%m")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn clp_uses_dot_thousands_separator() {
        assert_eq!(format_clp(0), "$0");
        assert_eq!(format_clp(950), "$950");
        assert_eq!(format_clp(20_000), "$20.000");
        assert_eq!(format_clp(1_234_567), "$1.234.567");
        assert_eq!(format_clp(-5_000), "-$5.000");
    }

    #[test]
    fn window_is_rendered_in_chile_time() {
        let start = Utc.with_ymd_and_hms(2025, 3, 5, 18, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 3, 5, 20, 30, 0).unwrap();
        assert_eq!(format_window(start, end), "entre 14:00 y 16:30 del 05/03");
    }
}
