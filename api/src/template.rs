use mailout_types::Recipient;

/// Replaces every merge tag with the matching recipient field. Fields the
/// recipient does not carry render as the empty string; anything that is
/// not one of the fixed tags passes through unchanged.
pub fn render(template: &str, recipient: &Recipient) -> String {
    let pairs: [(&str, &str); 9] = [
        ("{Email}", recipient.address.as_str()),
        ("{FirstName}", recipient.first_name.as_str()),
        ("{LastName}", recipient.last_name.as_str()),
        ("{Company}", recipient.company.as_str()),
        ("{Phone}", recipient.phone.as_str()),
        ("{City}", recipient.city.as_str()),
        ("{Country}", recipient.country.as_str()),
        ("{Custom1}", recipient.custom1.as_str()),
        ("{Custom2}", recipient.custom2.as_str()),
    ];

    let mut rendered = template.to_string();
    for (tag, value) in pairs {
        if rendered.contains(tag) {
            rendered = rendered.replace(tag, value);
        }
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipient() -> Recipient {
        Recipient {
            address: "ana@example.org".to_string(),
            first_name: "Ana".to_string(),
            company: "Acme".to_string(),
            ..Recipient::default()
        }
    }

    #[test]
    fn substitutes_fields_verbatim() {
        let rendered = render("Hi {FirstName} from {Company} <{Email}>", &recipient());
        assert_eq!(rendered, "Hi Ana from Acme <ana@example.org>");
    }

    #[test]
    fn missing_fields_render_empty() {
        let rendered = render("{FirstName} {LastName}{Custom1}", &recipient());
        assert_eq!(rendered, "Ana ");
    }

    #[test]
    fn no_satisfied_tag_survives_rendering() {
        let rendered = render("{Email}{FirstName}{Company}", &recipient());
        assert!(!rendered.contains("{Email}"));
        assert!(!rendered.contains("{FirstName}"));
        assert!(!rendered.contains("{Company}"));
    }

    #[test]
    fn unknown_placeholders_pass_through() {
        let rendered = render("Hello {Nickname}, {FirstName}", &recipient());
        assert_eq!(rendered, "Hello {Nickname}, Ana");
    }

    #[test]
    fn repeated_tags_all_substituted() {
        let rendered = render("{FirstName} and {FirstName} again", &recipient());
        assert_eq!(rendered, "Ana and Ana again");
    }
}
