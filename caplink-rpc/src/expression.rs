use serde_json::{json, Value};

use crate::serialize::{extract_reference_value, Param};

pub const EXPRESSION_KEY: &str = "$expr";

/// Deferred string expression, evaluated by the host.
/// `format` contains `{0}`, `{1}`, .. placeholders which refer to `value_providers`
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceExpression {
    format: String,
    value_providers: Vec<Value>,
}

impl ReferenceExpression {
    /// Make an expression. Fails if any of the `values` is null or isn't a
    /// primitive or handle-like value
    pub fn create(format: &str, values: &[Param]) -> crate::Result<Self> {
        let value_providers = values
            .iter()
            .map(extract_reference_value)
            .collect::<crate::Result<Vec<_>>>()?;

        Ok(Self {
            format: format.to_owned(),
            value_providers,
        })
    }

    pub fn builder() -> ReferenceExpressionBuilder {
        ReferenceExpressionBuilder::default()
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn value_providers(&self) -> &[Value] {
        &self.value_providers
    }

    pub fn to_wire(&self) -> crate::Result<Value> {
        Ok(json!({
            EXPRESSION_KEY: {
                "format": self.format,
                "valueProviders": self.value_providers,
            }
        }))
    }
}

impl crate::serialize::Serializable for ReferenceExpression {
    fn to_wire(&self) -> crate::Result<Value> {
        ReferenceExpression::to_wire(self)
    }
}

/// Builds an expression from interleaved literal text and values
#[derive(Debug, Default)]
pub struct ReferenceExpressionBuilder {
    format: String,
    values: Vec<Param>,
}

impl ReferenceExpressionBuilder {
    /// Append literal text. Braces are escaped
    pub fn literal(mut self, text: &str) -> Self {
        self.format
            .push_str(&text.replace('{', "{{").replace('}', "}}"));
        self
    }

    /// Append a value placeholder
    pub fn value(mut self, value: impl Into<Param>) -> Self {
        self.format.push_str(&format!("{{{}}}", self.values.len()));
        self.values.push(value.into());
        self
    }

    pub fn build(self) -> crate::Result<ReferenceExpression> {
        ReferenceExpression::create(&self.format, &self.values)
    }
}
