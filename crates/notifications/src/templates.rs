//! Localized notification templates.

use std::collections::HashMap;

use domain::Language;
use serde::{Deserialize, Serialize};

use crate::model::{NotificationType, Priority};

/// Used when a type has no active template and the request carries no text.
pub const FALLBACK_TITLE: &str = "إشعار جديد";
pub const FALLBACK_MESSAGE: &str = "لديك إشعار جديد";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Localized {
    pub ar: String,
    pub en: String,
}

impl Localized {
    pub fn new(ar: impl Into<String>, en: impl Into<String>) -> Self {
        Self {
            ar: ar.into(),
            en: en.into(),
        }
    }

    pub fn get(&self, language: Language) -> &str {
        match language {
            Language::Ar => &self.ar,
            Language::En => &self.en,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTemplate {
    pub notification_type: NotificationType,
    pub title: Localized,
    pub message: Localized,
    pub email_subject: Option<Localized>,
    pub email_body: Option<Localized>,
    pub sms: Option<Localized>,
    pub is_active: bool,
    pub priority: Priority,
}

impl NotificationTemplate {
    pub fn new(notification_type: NotificationType, title: Localized, message: Localized) -> Self {
        Self {
            notification_type,
            title,
            message,
            email_subject: None,
            email_body: None,
            sms: None,
            is_active: true,
            priority: Priority::Normal,
        }
    }

    pub fn with_email(mut self, subject: Localized, body: Localized) -> Self {
        self.email_subject = Some(subject);
        self.email_body = Some(body);
        self
    }

    pub fn with_sms(mut self, sms: Localized) -> Self {
        self.sms = Some(sms);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Text rendered for one notification in one language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedText {
    pub title: String,
    pub message: String,
    pub email_subject: String,
    pub email_body: String,
    pub sms: String,
}

impl RenderedText {
    /// Every channel shows the same title and message.
    pub fn plain(title: impl Into<String>, message: impl Into<String>) -> Self {
        let title = title.into();
        let message = message.into();
        Self {
            email_subject: title.clone(),
            email_body: message.clone(),
            sms: message.clone(),
            title,
            message,
        }
    }
}

/// Substitutes `{name}` placeholders. Unknown names are left in place.
pub fn render(text: &str, context: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = &after[..close];
                match context.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<NotificationType, NotificationTemplate>,
}

impl TemplateRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Templates for every order notification, in Arabic and English.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for template in default_templates() {
            registry.insert(template);
        }
        registry
    }

    /// Replaces any template for the same type.
    pub fn insert(&mut self, template: NotificationTemplate) {
        self.templates.insert(template.notification_type, template);
    }

    /// The active template for a type.
    pub fn get(&self, notification_type: NotificationType) -> Option<&NotificationTemplate> {
        self.templates
            .get(&notification_type)
            .filter(|t| t.is_active)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Renders the type's template, or the generic fallback text.
    pub fn render(
        &self,
        notification_type: NotificationType,
        language: Language,
        context: &HashMap<String, String>,
    ) -> RenderedText {
        let Some(template) = self.get(notification_type) else {
            return RenderedText::plain(FALLBACK_TITLE, FALLBACK_MESSAGE);
        };
        let title = render(template.title.get(language), context);
        let message = render(template.message.get(language), context);
        let localized = |text: &Option<Localized>, default: &str| {
            text.as_ref()
                .map(|t| render(t.get(language), context))
                .unwrap_or_else(|| default.to_string())
        };
        RenderedText {
            email_subject: localized(&template.email_subject, &title),
            email_body: localized(&template.email_body, &message),
            sms: localized(&template.sms, &message),
            title,
            message,
        }
    }

    /// Default priority for a type, `normal` without a template.
    pub fn priority(&self, notification_type: NotificationType) -> Priority {
        self.get(notification_type)
            .map(|t| t.priority)
            .unwrap_or_default()
    }
}

fn default_templates() -> Vec<NotificationTemplate> {
    vec![
        NotificationTemplate::new(
            NotificationType::NewOrder,
            Localized::new("طلب جديد", "New order"),
            Localized::new(
                "لديك طلب جديد على المنتج: {item_title}",
                "You have a new order for: {item_title}",
            ),
        )
        .with_email(
            Localized::new("طلب جديد رقم {order_number}", "New order {order_number}"),
            Localized::new(
                "لديك طلب جديد على المنتج: {item_title}\nرقم الطلب: {order_number}",
                "You have a new order for: {item_title}\nOrder number: {order_number}",
            ),
        )
        .with_sms(Localized::new(
            "طلب جديد {order_number} على {item_title}",
            "New order {order_number} for {item_title}",
        ))
        .with_priority(Priority::High),
        NotificationTemplate::new(
            NotificationType::OrderAccepted,
            Localized::new("تم قبول الطلب", "Order accepted"),
            Localized::new(
                "تم قبول طلبك للمنتج: {item_title}",
                "Your order for {item_title} was accepted",
            ),
        )
        .with_sms(Localized::new(
            "تم قبول طلبك {order_number}",
            "Your order {order_number} was accepted",
        )),
        NotificationTemplate::new(
            NotificationType::OrderRejected,
            Localized::new("تم رفض الطلب", "Order rejected"),
            Localized::new(
                "تم رفض طلبك للمنتج: {item_title}",
                "Your order for {item_title} was rejected",
            ),
        ),
        NotificationTemplate::new(
            NotificationType::OrderCompleted,
            Localized::new("تم إكمال الطلب", "Order completed"),
            Localized::new(
                "تم إكمال طلبك للمنتج: {item_title}",
                "Your order for {item_title} is complete",
            ),
        ),
        NotificationTemplate::new(
            NotificationType::OrderCancelled,
            Localized::new("تم إلغاء الطلب", "Order cancelled"),
            Localized::new(
                "تم إلغاء الطلب للمنتج: {item_title}",
                "The order for {item_title} was cancelled",
            ),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn render_substitutes_known_placeholders() {
        let ctx = context(&[("item_title", "Lamp")]);
        assert_eq!(render("Order for {item_title}", &ctx), "Order for Lamp");
        assert_eq!(render("{missing} stays", &ctx), "{missing} stays");
        assert_eq!(render("open { brace", &ctx), "open { brace");
        assert_eq!(render("", &ctx), "");
    }

    #[test]
    fn renders_in_the_requested_language() {
        let registry = TemplateRegistry::with_defaults();
        let ctx = context(&[("item_title", "Lamp"), ("order_number", "AB12CD34")]);

        let en = registry.render(NotificationType::NewOrder, Language::En, &ctx);
        assert_eq!(en.title, "New order");
        assert_eq!(en.message, "You have a new order for: Lamp");
        assert_eq!(en.email_subject, "New order AB12CD34");
        assert_eq!(en.sms, "New order AB12CD34 for Lamp");

        let ar = registry.render(NotificationType::OrderAccepted, Language::Ar, &ctx);
        assert_eq!(ar.title, "تم قبول الطلب");
        assert_eq!(ar.message, "تم قبول طلبك للمنتج: Lamp");
        // no email template: subject and body reuse the title and message
        assert_eq!(ar.email_subject, ar.title);
        assert_eq!(ar.email_body, ar.message);
    }

    #[test]
    fn missing_or_inactive_template_falls_back() {
        let mut registry = TemplateRegistry::with_defaults();
        let text = registry.render(NotificationType::ItemLiked, Language::En, &HashMap::new());
        assert_eq!(text.title, FALLBACK_TITLE);
        assert_eq!(text.message, FALLBACK_MESSAGE);

        let template = registry
            .get(NotificationType::OrderRejected)
            .cloned()
            .unwrap()
            .inactive();
        registry.insert(template);
        let text = registry.render(NotificationType::OrderRejected, Language::En, &HashMap::new());
        assert_eq!(text.title, FALLBACK_TITLE);
    }

    #[test]
    fn new_order_defaults_to_high_priority() {
        let registry = TemplateRegistry::with_defaults();
        assert_eq!(registry.priority(NotificationType::NewOrder), Priority::High);
        assert_eq!(
            registry.priority(NotificationType::OrderCompleted),
            Priority::Normal
        );
        assert_eq!(registry.priority(NotificationType::Promotion), Priority::Normal);
    }
}
