//! Direct-SMS bodies used when no campaign is configured for a category

use chrono::NaiveDate;

/// Firm details printed in message footers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmProfile {
    pub name: String,
    pub phone: String,
    pub website: String,
}

impl Default for FirmProfile {
    fn default() -> Self {
        Self {
            name: "Vasquez Law Firm".to_string(),
            phone: "1-844-YO-PELEO".to_string(),
            website: "vasquezlawnc.com".to_string(),
        }
    }
}

/// "Tuesday, March 4" style date used in reminders.
pub fn long_date(date: NaiveDate) -> String {
    date.format("%A, %B %-d").to_string()
}

pub fn appointment_reminder(
    firm: &FirmProfile,
    client_name: &str,
    appointment_type: &str,
    attorney_name: &str,
    date: NaiveDate,
    time: &str,
    location: Option<&str>,
) -> String {
    let mut message = format!(
        "Hi {},\n\nReminder: You have a {} appointment with {} on {} at {}.",
        client_name,
        appointment_type,
        attorney_name,
        long_date(date),
        time
    );
    match location {
        Some(location) => {
            message.push_str("\n\nLocation: ");
            message.push_str(location);
        }
        None => message.push_str("\n\nThis is a phone consultation. We will call you at this number."),
    }
    message.push_str(&format!(
        "\n\nReply CONFIRM to confirm or call {} to reschedule.",
        firm.phone
    ));
    message
}

pub fn case_update(
    firm: &FirmProfile,
    client_name: &str,
    case_number: &str,
    update_type: &str,
    message: &str,
) -> String {
    format!(
        "Hello {},\n\nCase Update ({}):\n{}\n\n{}\n\nQuestions? Call {} or visit {}\n\n- {}",
        client_name, case_number, update_type, message, firm.phone, firm.website, firm.name
    )
}

pub fn welcome(firm: &FirmProfile, first_name: &str) -> String {
    format!(
        "Welcome to {}, {}!\n\nThank you for reaching out. An attorney will review your information and contact you shortly.\n\nNeed immediate help? Call {}.",
        firm.name, first_name, firm.phone
    )
}

pub fn general(firm: &FirmProfile, name: &str, message: &str) -> String {
    format!("Hello {},\n\n{}\n\n- {}", name, message, firm.name)
}

/// Lowercase, dash-separated form of a free-text label, for use as a tag.
pub fn tag_slug(label: &str) -> String {
    label
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    #[test]
    fn long_date_has_no_zero_padding() {
        assert_eq!(long_date(date()), "Tuesday, March 5");
    }

    #[test]
    fn reminder_without_location_mentions_phone_consultation() {
        let body = appointment_reminder(
            &FirmProfile::default(),
            "Ana Ruiz",
            "consultation",
            "Mr. Vasquez",
            date(),
            "10:00 AM",
            None,
        );
        assert!(body.starts_with("Hi Ana Ruiz,\n\nReminder: You have a consultation appointment with Mr. Vasquez on Tuesday, March 5 at 10:00 AM."));
        assert!(body.contains("phone consultation"));
        assert!(body.ends_with("call 1-844-YO-PELEO to reschedule."));
    }

    #[test]
    fn reminder_with_location() {
        let body = appointment_reminder(
            &FirmProfile::default(),
            "Ana",
            "court",
            "Ms. Lee",
            date(),
            "9:00 AM",
            Some("Raleigh office"),
        );
        assert!(body.contains("\n\nLocation: Raleigh office"));
        assert!(!body.contains("phone consultation"));
    }

    #[test]
    fn case_update_footer_uses_firm_profile() {
        let firm = FirmProfile {
            name: "Acme Legal".into(),
            phone: "555-0100".into(),
            website: "acme.test".into(),
        };
        let body = case_update(&firm, "Bo", "CV-12", "Hearing scheduled", "See you there.");
        assert!(body.contains("Case Update (CV-12):\nHearing scheduled"));
        assert!(body.ends_with("Questions? Call 555-0100 or visit acme.test\n\n- Acme Legal"));
    }

    #[test]
    fn slugs() {
        assert_eq!(tag_slug("Hearing Scheduled"), "hearing-scheduled");
        assert_eq!(tag_slug("  Status: Filed! "), "status-filed");
        assert_eq!(tag_slug(""), "");
    }
}
