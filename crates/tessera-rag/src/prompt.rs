use tessera_core::{Context, TesseraError};

const DEFAULT_TEMPLATE: &str = "\
Answer the question using the context below. \
If the context is empty or does not help, say so and answer from general knowledge.

Context:
{context}

Question: {question}
";

const CONTEXT_SLOT: &str = "{context}";
const QUESTION_SLOT: &str = "{question}";

/// Prompt layout with `{context}` and `{question}` placeholders.
///
/// The context section is rendered even when no context was found, so the
/// model can tell the difference between "nothing relevant" and a missing
/// section.
///
/// # Examples
///
/// ```
/// use tessera_core::Context;
/// use tessera_rag::prompt::PromptTemplate;
///
/// let template = PromptTemplate::default();
/// let prompt = template.render(&Context::empty("\n\n"), "capital of France");
/// assert!(prompt.contains("Context:\n\n"));
/// assert!(prompt.contains("Question: capital of France"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    /// Use a custom template.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::InvalidConfig`] unless both placeholders are present.
    ///
    /// # Examples
    ///
    /// ```
    /// use tessera_rag::prompt::PromptTemplate;
    ///
    /// assert!(PromptTemplate::new("{context}\n---\n{question}").is_ok());
    /// assert!(PromptTemplate::new("no placeholders").is_err());
    /// ```
    pub fn new(template: &str) -> Result<Self, TesseraError> {
        for slot in [CONTEXT_SLOT, QUESTION_SLOT] {
            if !template.contains(slot) {
                return Err(TesseraError::InvalidConfig(format!(
                    "prompt template must contain {slot}"
                )));
            }
        }
        Ok(Self {
            template: template.to_string(),
        })
    }

    /// Template from configuration, or the default one.
    ///
    /// # Errors
    ///
    /// Same as [`PromptTemplate::new`].
    pub fn from_option(template: Option<&str>) -> Result<Self, TesseraError> {
        template.map_or_else(|| Ok(Self::default()), Self::new)
    }

    /// Fill the placeholders in a single pass.
    ///
    /// Placeholder-like text inside the context or question is left as is.
    pub fn render(&self, context: &Context, question: &str) -> String {
        let context = context.render();
        let mut out = String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();

        while let Some(pos) = rest.find('{') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if let Some(after) = tail.strip_prefix(CONTEXT_SLOT) {
                out.push_str(&context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(QUESTION_SLOT) {
                out.push_str(question);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prompt_contains_context_and_question() {
        let ctx = Context::new(vec!["Paris is the capital.".into(), "Lyon is big.".into()], "\n\n");
        let prompt = PromptTemplate::default().render(&ctx, "capital of France");
        assert!(prompt.contains("Context:\nParis is the capital.\n\nLyon is big.\n"));
        assert!(prompt.ends_with("Question: capital of France\n"));
    }

    #[test]
    fn empty_context_keeps_section() {
        let prompt = PromptTemplate::default().render(&Context::empty("\n\n"), "q");
        assert!(prompt.contains("Context:\n\n\nQuestion: q"));
    }

    #[test]
    fn placeholders_in_inputs_are_not_expanded() {
        let template = PromptTemplate::new("[{context}] {question}").unwrap();
        let ctx = Context::new(vec!["{question}".into()], "\n");
        assert_eq!(template.render(&ctx, "{context}?"), "[{question}] {context}?");
    }

    #[test]
    fn stray_braces_survive() {
        let template = PromptTemplate::new("{x} {context} {question} }{").unwrap();
        assert_eq!(template.render(&Context::empty(""), "q"), "{x}  q }{");
    }

    #[test]
    fn missing_placeholder_is_invalid_config() {
        let err = PromptTemplate::new("{context} only").unwrap_err();
        assert!(matches!(err, TesseraError::InvalidConfig(_)));
        assert!(PromptTemplate::from_option(None).is_ok());
        assert!(PromptTemplate::from_option(Some("{question}")).is_err());
    }
}
