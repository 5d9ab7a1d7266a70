//! WhatsApp help link for visitors who cannot upload their photos

use anyhow::{bail, Context, Result};
use reqwest::Url;

/// Build a `https://wa.me/<digits>?text=<message>` link
///
/// `{size}` and `{frame}` in the template are replaced with the labels given;
/// a missing label becomes an empty string.
pub fn support_link(
    contact: &str,
    template: &str,
    size_label: Option<&str>,
    frame_label: Option<&str>,
) -> Result<Url> {
    let digits: String = contact.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        bail!("support contact '{}' has no phone number", contact);
    }

    let message = template
        .replace("{size}", size_label.unwrap_or_default())
        .replace("{frame}", frame_label.unwrap_or_default());

    Url::parse_with_params(&format!("https://wa.me/{}", digits), &[("text", message)])
        .context("Failed to build support link")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_strips_contact_formatting() {
        let url = support_link("+351 912 345 678", "Hi", None, None).unwrap();
        assert_eq!(url.as_str(), "https://wa.me/351912345678?text=Hi");
    }

    #[test]
    fn test_template_substitution_is_encoded() {
        let url = support_link(
            "+351913954511",
            "Order {size}, {frame} frame",
            Some("30x40cm"),
            Some("Preta"),
        )
        .unwrap();

        let text: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            text,
            vec![("text".to_string(), "Order 30x40cm, Preta frame".to_string())]
        );
        assert!(!url.as_str().contains(' '));
    }

    #[test]
    fn test_contact_without_digits_fails() {
        assert!(support_link("call us", "Hi", None, None).is_err());
    }
}
