use std::collections::BTreeMap;
use std::fmt;

use psylens_core::models::analysis::{AnalysisRequest, AnalysisType};

use crate::error::{AnalysisError, RegistryError};
use crate::parse::{ParserFn, StructuredResult, standard_parser};
use crate::prompts::{CURRENT_TEXT, PromptTemplate, TEXT, standard_template};

/// Template and parser registered for one analysis type.
#[derive(Clone, Copy)]
pub struct RegistryEntry {
    pub template: PromptTemplate,
    pub parser: ParserFn,
}

/// Closed dispatch from analysis type to its template and parser.
///
/// Built once at startup and read-only afterwards. A type is either fully
/// registered or absent; requests for absent types are rejected before any
/// external call.
#[derive(Clone)]
pub struct AnalysisRegistry {
    entries: BTreeMap<AnalysisType, RegistryEntry>,
}

impl fmt::Debug for AnalysisRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisRegistry")
            .field("types", &self.supported_types())
            .finish()
    }
}

impl AnalysisRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Every analysis type with its built-in template and parser.
    pub fn standard() -> Result<Self, RegistryError> {
        AnalysisType::ALL
            .into_iter()
            .fold(Self::builder(), |builder, t| {
                builder
                    .with_template(t, standard_template(t))
                    .with_parser(t, standard_parser(t))
            })
            .build()
    }

    pub fn supports(&self, analysis_type: AnalysisType) -> bool {
        self.entries.contains_key(&analysis_type)
    }

    /// Registered types, in stable order.
    pub fn supported_types(&self) -> Vec<AnalysisType> {
        self.entries.keys().copied().collect()
    }

    pub fn entry(&self, analysis_type: AnalysisType) -> Result<&RegistryEntry, AnalysisError> {
        self.entries.get(&analysis_type).ok_or_else(|| {
            AnalysisError::Validation(format!("analysis type '{analysis_type}' is not enabled"))
        })
    }

    /// Everything that can be checked without calling out: bounds,
    /// parameters, registration and caller-supplied template variables.
    pub fn validate_request(&self, request: &AnalysisRequest) -> Result<(), AnalysisError> {
        request.validate()?;
        let entry = self.entry(request.analysis_type)?;
        for variable in entry.template.caller_variables() {
            let present = request
                .prompt_options
                .get(variable)
                .is_some_and(|v| !v.trim().is_empty());
            if !present {
                return Err(AnalysisError::Validation(format!(
                    "{} requires prompt option '{variable}'",
                    request.analysis_type
                )));
            }
        }
        Ok(())
    }

    /// Render the prompt from already-masked text and options.
    pub fn build_prompt(
        &self,
        analysis_type: AnalysisType,
        sanitized_text: &str,
        sanitized_options: &BTreeMap<String, String>,
    ) -> Result<String, AnalysisError> {
        let entry = self.entry(analysis_type)?;
        let mut vars = sanitized_options.clone();
        vars.insert(TEXT.to_string(), sanitized_text.to_string());
        vars.entry(CURRENT_TEXT.to_string())
            .or_insert_with(|| sanitized_text.to_string());
        entry.template.render(&vars)
    }

    pub fn parse(
        &self,
        analysis_type: AnalysisType,
        raw: &str,
    ) -> Result<StructuredResult, AnalysisError> {
        let entry = self.entry(analysis_type)?;
        Ok((entry.parser)(raw)?)
    }
}

/// Collects templates and parsers, then checks they pair up.
#[derive(Default)]
pub struct RegistryBuilder {
    templates: BTreeMap<AnalysisType, PromptTemplate>,
    parsers: BTreeMap<AnalysisType, ParserFn>,
}

impl RegistryBuilder {
    pub fn with_template(mut self, analysis_type: AnalysisType, template: PromptTemplate) -> Self {
        self.templates.insert(analysis_type, template);
        self
    }

    pub fn with_parser(mut self, analysis_type: AnalysisType, parser: ParserFn) -> Self {
        self.parsers.insert(analysis_type, parser);
        self
    }

    pub fn build(mut self) -> Result<AnalysisRegistry, RegistryError> {
        let mut entries = BTreeMap::new();
        for analysis_type in AnalysisType::ALL {
            let template = self.templates.remove(&analysis_type);
            let parser = self.parsers.remove(&analysis_type);
            match (template, parser) {
                (Some(template), Some(parser)) => {
                    if let Some(variable) = template
                        .variables
                        .iter()
                        .copied()
                        .find(|v| !template.text.contains(&format!("{{{v}}}")))
                    {
                        return Err(RegistryError::UnusedVariable {
                            analysis_type,
                            variable,
                        });
                    }
                    entries.insert(analysis_type, RegistryEntry { template, parser });
                }
                (Some(_), None) => return Err(RegistryError::MissingParser(analysis_type)),
                (None, Some(_)) => return Err(RegistryError::MissingTemplate(analysis_type)),
                (None, None) => {}
            }
        }
        Ok(AnalysisRegistry { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::BASELINE_TEXT;

    #[test]
    fn standard_registry_covers_every_type() {
        let registry = AnalysisRegistry::standard().unwrap();
        assert_eq!(registry.supported_types(), AnalysisType::ALL.to_vec());
    }

    #[test]
    fn half_registered_type_is_refused() {
        let t = AnalysisType::SentimentAnalysis;
        let err = AnalysisRegistry::builder()
            .with_template(t, standard_template(t))
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::MissingParser(AnalysisType::SentimentAnalysis)));

        let err = AnalysisRegistry::builder()
            .with_parser(t, standard_parser(t))
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::MissingTemplate(AnalysisType::SentimentAnalysis)));
    }

    #[test]
    fn template_must_use_declared_variables() {
        let t = AnalysisType::RiskAssessment;
        let err = AnalysisRegistry::builder()
            .with_template(
                t,
                PromptTemplate {
                    text: "no placeholders here",
                    variables: &[TEXT],
                },
            )
            .with_parser(t, standard_parser(t))
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnusedVariable { variable: "text", .. }));
    }

    #[test]
    fn unregistered_type_is_a_validation_error() {
        let t = AnalysisType::RiskAssessment;
        let registry = AnalysisRegistry::builder()
            .with_template(t, standard_template(t))
            .with_parser(t, standard_parser(t))
            .build()
            .unwrap();
        let request = AnalysisRequest::new("I feel low today", AnalysisType::WellnessDimensions);
        assert!(matches!(
            registry.validate_request(&request),
            Err(AnalysisError::Validation(_))
        ));
        assert!(!registry.supports(AnalysisType::WellnessDimensions));
    }

    #[test]
    fn progress_requires_baseline_option() {
        let registry = AnalysisRegistry::standard().unwrap();
        let request = AnalysisRequest::new("Sleeping better now", AnalysisType::ProgressComparison);
        assert!(registry.validate_request(&request).is_err());

        let request = request.with_option(BASELINE_TEXT, "Not sleeping at all");
        assert!(registry.validate_request(&request).is_ok());
    }

    #[test]
    fn progress_prompt_defaults_current_text_to_request_text() {
        let registry = AnalysisRegistry::standard().unwrap();
        let options = BTreeMap::from([(BASELINE_TEXT.to_string(), "before".to_string())]);
        let prompt = registry
            .build_prompt(AnalysisType::ProgressComparison, "after", &options)
            .unwrap();
        assert!(prompt.contains("Earlier note:\n\"\"\"\nbefore\n\"\"\""));
        assert!(prompt.contains("Recent note:\n\"\"\"\nafter\n\"\"\""));
    }
}
