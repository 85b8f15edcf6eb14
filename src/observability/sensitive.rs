// SPDX-License-Identifier: Apache-2.0

use std::fmt::{self, Debug, Display, Formatter};

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use shardline_core::{Value, ValueFamily};

/// Log view of the parameters bound to one SQL unit.
///
/// Unless `sql_show_parameters` is enabled only the shape of each parameter
/// is written: NULL stays visible, every other value becomes
/// `<family>` (`[<numeric>, <text>, NULL]`). Serialization follows the same
/// rule, with `"***"` in place of each hidden value.
#[derive(Clone, Copy)]
pub struct SensitiveParameters<'a> {
    parameters: &'a [Value],
    show: bool,
}

impl<'a> SensitiveParameters<'a> {
    pub fn new(parameters: &'a [Value], show: bool) -> Self {
        Self { parameters, show }
    }

    pub fn redacted(parameters: &'a [Value]) -> Self {
        Self::new(parameters, false)
    }

    pub fn expose(&self) -> &'a [Value] {
        self.parameters
    }
}

fn family_name(family: ValueFamily) -> &'static str {
    match family {
        ValueFamily::Null => "NULL",
        ValueFamily::Bool => "<bool>",
        ValueFamily::Numeric => "<numeric>",
        ValueFamily::Text => "<text>",
        ValueFamily::Bytes => "<bytes>",
        ValueFamily::Temporal => "<temporal>",
    }
}

impl Debug for SensitiveParameters<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.show {
            return Debug::fmt(self.parameters, f);
        }
        write!(f, "[")?;
        for (i, value) in self.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", family_name(value.family()))?;
        }
        write!(f, "]")
    }
}

impl Display for SensitiveParameters<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

impl Serialize for SensitiveParameters<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if self.show {
            return self.parameters.serialize(serializer);
        }
        let mut seq = serializer.serialize_seq(Some(self.parameters.len()))?;
        for value in self.parameters {
            if value.is_null() {
                seq.serialize_element(value)?;
            } else {
                seq.serialize_element("***")?;
            }
        }
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Vec<Value> {
        vec![Value::from("card-4111"), Value::Int(7), Value::Null]
    }

    #[test]
    fn hides_values_but_keeps_their_shape() {
        let params = params();
        let view = SensitiveParameters::redacted(&params);
        let rendered = format!("{view:?}");
        assert_eq!(rendered, "[<text>, <numeric>, NULL]");
        assert!(!rendered.contains("4111"));
        assert_eq!(view.to_string(), rendered);
        assert_eq!(serde_json::to_string(&view).unwrap(), r#"["***","***","Null"]"#);
        assert_eq!(view.expose().len(), 3);
    }

    #[test]
    fn shows_values_when_enabled() {
        let params = params();
        let view = SensitiveParameters::new(&params, true);
        assert_eq!(format!("{view:?}"), format!("{params:?}"));
        assert_eq!(
            serde_json::to_string(&view).unwrap(),
            serde_json::to_string(&params).unwrap()
        );
    }

    #[test]
    fn empty_parameter_list() {
        assert_eq!(format!("{:?}", SensitiveParameters::redacted(&[])), "[]");
    }
}
