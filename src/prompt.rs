//! Per-row prompt rendering from a template with `{Column Name}` placeholders.

use std::collections::HashMap;
use std::sync::OnceLock;

use log::warn;
use regex::{Captures, Regex};

use crate::dataset::{normalize_cell, Dataset};
use crate::types::PromptText;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([^{}\n]+)\}").expect("placeholder pattern is valid"))
}

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
    columns: HashMap<String, usize>,
}

impl PromptTemplate {
    /// Binds `template` to the headers of `dataset`. Placeholders naming no
    /// column are reported here, once, and rendered verbatim.
    pub fn new(template: &str, dataset: &Dataset) -> Self {
        let columns: HashMap<String, usize> = dataset
            .headers()
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), i))
            .collect();

        let mut unknown: Vec<&str> = placeholder_pattern()
            .captures_iter(template)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str())
            .filter(|name| !columns.contains_key(name.trim()))
            .collect();
        unknown.sort_unstable();
        unknown.dedup();
        if !unknown.is_empty() {
            warn!(
                "Prompt template references unknown column(s) {:?}; they will be left as written",
                unknown
            );
        }

        Self {
            template: template.to_string(),
            columns,
        }
    }

    pub fn render(&self, dataset: &Dataset, row: usize) -> PromptText {
        placeholder_pattern()
            .replace_all(&self.template, |caps: &Captures| {
                match self.columns.get(caps[1].trim()) {
                    Some(&col) => normalize_cell(dataset.cell(row, col)).to_string(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn dataset() -> Dataset {
        let csv = "Eksternt varenr.,Beskrivelse,Leverandør\n 100-234 ,Hex bolt M8,Acme\n";
        Dataset::from_reader(csv.as_bytes(), Path::new("items.csv"), b',').unwrap()
    }

    #[test]
    fn substitutes_column_values() {
        let dataset = dataset();
        let template = PromptTemplate::new(
            "Find the net weight of {Eksternt varenr.} from {Leverandør}: {Beskrivelse}.",
            &dataset,
        );
        assert_eq!(
            template.render(&dataset, 0),
            "Find the net weight of 100-234 from Acme: Hex bolt M8."
        );
    }

    #[test]
    fn unknown_placeholders_stay_verbatim() {
        let dataset = dataset();
        let template = PromptTemplate::new("Use \"{Climatic factor navn}\" for {Leverandør}", &dataset);
        assert_eq!(template.render(&dataset, 0), "Use \"{Climatic factor navn}\" for Acme");
    }

    #[test]
    fn template_without_placeholders_is_unchanged() {
        let dataset = dataset();
        let template = PromptTemplate::new("Respond with four lines.", &dataset);
        assert_eq!(template.render(&dataset, 0), "Respond with four lines.");
    }
}
