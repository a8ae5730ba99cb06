/// Categories always requested from the classifier.
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "NAME",
    "EMAIL",
    "PHONE",
    "ADDRESS",
    "SSN",
    "DATE_OF_BIRTH",
    "ACCOUNT_NUMBER",
    "CREDIT_CARD",
    "PASSPORT",
    "DRIVER_LICENSE",
    "IP_ADDRESS",
];

const SYSTEM_PROMPT: &str = r#"You find personally identifiable information (PII) in text extracted from a document.

Report every occurrence of the following categories: {categories}.

RULES:
1. Copy each value EXACTLY as it appears in the text, character for character. Do not correct spelling, reformat numbers, or expand abbreviations.
2. Report a value once even if it appears several times.
3. Do not report field labels (e.g. "Name:", "SSN") or generic words, only the sensitive values themselves.
4. If a value is split across lines, report it with a single space where the line break was.
5. If there is no PII, return an empty list.

Respond with ONLY a JSON object of the form:
{"pii": [{"value": "John Smith", "category": "NAME"}, {"value": "123-45-6789", "category": "SSN"}]}"#;

/// System prompt naming the built-in taxonomy plus any `extra` categories.
pub fn system_prompt(extra: &[String]) -> String {
    let mut categories: Vec<String> = DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect();
    for category in extra {
        let category = category.trim().to_uppercase();
        if !category.is_empty() && !categories.contains(&category) {
            categories.push(category);
        }
    }
    SYSTEM_PROMPT.replace("{categories}", &categories.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extra_categories_are_appended_once() {
        let prompt = system_prompt(&["medical_record".to_string(), "ssn".to_string()]);
        assert!(prompt.contains("IP_ADDRESS, MEDICAL_RECORD."));
        assert_eq!(prompt.matches("MEDICAL_RECORD").count(), 1);
        let list = prompt.lines().find(|l| l.starts_with("Report every")).unwrap();
        assert_eq!(list.matches("SSN").count(), 1);
        assert!(!prompt.contains("{categories}"));
    }
}
