use std::collections::{BTreeMap, HashMap, HashSet};

use super::trie::{PatternPart, TokenClass, Trie, TrieBuilder};
use crate::core::error::{BundlerError, Result};

/// A request path matched against one of the parser's forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedContentPath {
    /// Name of the matched request form.
    pub form_name: String,
    /// Placeholder values keyed by token name.
    pub properties: BTreeMap<String, String>,
}

impl ParsedContentPath {
    /// Value of the placeholder `token`, if the form has one.
    pub fn property(&self, token: &str) -> Option<&str> {
        self.properties.get(token).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
struct RequestForm {
    name: String,
    template: String,
    parts: Vec<PatternPart>,
    tokens: Vec<(String, TokenClass)>,
}

/// Collects request templates and token classes for a [`ContentPathParser`].
///
/// ```
/// use bundleflow::router::{ContentPathParserBuilder, TokenClass};
///
/// let parser = ContentPathParserBuilder::new()
///     .accepts("js/dev/<minifier-setting>/bundle.js")
///     .as_form("dev-bundle-request")
///     .where_token("minifier-setting")
///     .has_form(TokenClass::Name)
///     .build()
///     .unwrap();
///
/// let path = parser
///     .create_request("dev-bundle-request", &["combined"])
///     .unwrap();
/// assert_eq!(path, "js/dev/combined/bundle.js");
/// ```
#[derive(Debug, Default)]
pub struct ContentPathParserBuilder {
    templates: Vec<(String, Option<String>)>,
    token_classes: Vec<(String, Option<TokenClass>)>,
}

impl ContentPathParserBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a request template; name it with [`as_form`](Self::as_form).
    pub fn accepts(mut self, template: &str) -> Self {
        self.templates.push((template.to_string(), None));
        self
    }

    /// Adds a further request template.
    pub fn and(self, template: &str) -> Self {
        self.accepts(template)
    }

    /// Names the most recently added template.
    pub fn as_form(mut self, name: &str) -> Self {
        if let Some(last) = self.templates.last_mut() {
            last.1 = Some(name.to_string());
        }
        self
    }

    /// Declares a placeholder token; give its class with [`has_form`](Self::has_form).
    pub fn where_token(mut self, token: &str) -> Self {
        self.token_classes.push((token.to_string(), None));
        self
    }

    /// Sets the class of the most recently declared token.
    pub fn has_form(mut self, class: TokenClass) -> Self {
        if let Some(last) = self.token_classes.last_mut() {
            last.1 = Some(class);
        }
        self
    }

    /// Compiles every template into one trie.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRequest` for an unnamed template, a template using an
    /// undeclared token or the same token twice, an unterminated placeholder,
    /// a duplicate form name and a duplicate template.
    pub fn build(self) -> Result<ContentPathParser> {
        let mut classes = HashMap::new();
        for (token, class) in self.token_classes {
            let class = class.ok_or_else(|| {
                BundlerError::malformed_request(
                    format!("<{}>", token),
                    "token has no character class",
                )
            })?;
            _ = classes.insert(token, class);
        }

        let mut forms = Vec::with_capacity(self.templates.len());
        let mut names = HashSet::new();
        let mut trie = TrieBuilder::new();

        for (template, name) in self.templates {
            let name = name.ok_or_else(|| {
                BundlerError::malformed_request(&template, "template has no form name")
            })?;
            if !names.insert(name.clone()) {
                return Err(BundlerError::malformed_request(
                    &template,
                    format!("form name '{}' is used twice", name),
                ));
            }

            let (parts, tokens) = split_template(&template, &classes)?;
            if trie.insert(&parts, forms.len()).is_err() {
                return Err(BundlerError::malformed_request(
                    &template,
                    "template duplicates another form",
                ));
            }
            forms.push(RequestForm {
                name,
                template,
                parts,
                tokens,
            });
        }

        Ok(ContentPathParser {
            forms,
            trie: trie.build(),
        })
    }
}

fn split_template(
    template: &str,
    classes: &HashMap<String, TokenClass>,
) -> Result<(Vec<PatternPart>, Vec<(String, TokenClass)>)> {
    let mut parts = Vec::new();
    let mut tokens: Vec<(String, TokenClass)> = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find('<') {
        if open > 0 {
            parts.push(PatternPart::Literal(rest[..open].to_string()));
        }
        let after = &rest[open + 1..];
        let close = after.find('>').ok_or_else(|| {
            BundlerError::malformed_request(template, "unterminated placeholder")
        })?;
        let token = &after[..close];
        let class = *classes.get(token).ok_or_else(|| {
            BundlerError::malformed_request(
                template,
                format!("token '{}' has not been declared", token),
            )
        })?;
        if tokens.iter().any(|(seen, _)| seen == token) {
            return Err(BundlerError::malformed_request(
                template,
                format!("token '{}' appears more than once", token),
            ));
        }
        tokens.push((token.to_string(), class));
        parts.push(PatternPart::Token(class));
        rest = &after[close + 1..];
    }
    if !rest.is_empty() {
        parts.push(PatternPart::Literal(rest.to_string()));
    }

    Ok((parts, tokens))
}

/// Matches request paths against a set of named templates and renders
/// requests back from placeholder values.
#[derive(Debug)]
pub struct ContentPathParser {
    forms: Vec<RequestForm>,
    trie: Trie<usize>,
}

impl ContentPathParser {
    /// Names of the request forms, in declaration order.
    pub fn form_names(&self) -> impl Iterator<Item = &str> {
        self.forms.iter().map(|form| form.name.as_str())
    }

    /// Parses a request path.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRequest` when no template matches the whole path.
    pub fn parse(&self, path: &str) -> Result<ParsedContentPath> {
        let (index, captures) = self.trie.find(path).ok_or_else(|| {
            BundlerError::malformed_request(path, "no request form matches")
        })?;
        let form = &self.forms[*index];

        let properties = form
            .tokens
            .iter()
            .zip(captures)
            .map(|((token, _), value)| (token.clone(), value.to_string()))
            .collect();

        Ok(ParsedContentPath {
            form_name: form.name.clone(),
            properties,
        })
    }

    /// Renders a request for `form` with `values` in placeholder order.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRequest` for an unknown form and `MalformedToken`
    /// when the number of values is wrong or a value falls outside the class
    /// of its placeholder.
    pub fn create_request(&self, form: &str, values: &[&str]) -> Result<String> {
        let request_form = self
            .forms
            .iter()
            .find(|candidate| candidate.name == form)
            .ok_or_else(|| {
                BundlerError::malformed_request(form, "unknown request form")
            })?;

        if values.len() != request_form.tokens.len() {
            return Err(BundlerError::malformed_token(
                form,
                values.join(", "),
                format!(
                    "supplies {} values but '{}' has {} placeholders",
                    values.len(),
                    request_form.template,
                    request_form.tokens.len()
                ),
            ));
        }

        let mut request = String::new();
        let mut next_value = values.iter();
        for part in &request_form.parts {
            match part {
                PatternPart::Literal(literal) => request.push_str(literal),
                PatternPart::Token(_) => {
                    if let Some(value) = next_value.next() {
                        request.push_str(value);
                    }
                }
            }
        }

        for ((token, class), value) in request_form.tokens.iter().zip(values) {
            if !class.is_valid(value) {
                return Err(BundlerError::malformed_token(
                    token.as_str(),
                    *value,
                    format!("is not a valid {:?} token", class),
                ));
            }
        }

        Ok(request)
    }

    /// Convenience wrapper building a parsed path for `form` without going
    /// through a request string.
    pub fn parsed(&self, form: &str, values: &[&str]) -> Result<ParsedContentPath> {
        let request = self.create_request(form, values)?;
        self.parse(&request)
    }
}
