use std::str::FromStr;

use jdescriptor::{DescriptorError, MethodDescriptor, TypeDescriptor};

/// Parameter and return types of a method, as Java source type names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodShape {
    pub parameter_types: Vec<String>,
    pub return_type: String,
}

/// Parse a JVM method descriptor such as `(Ljava/lang/String;I)V`.
pub fn parse_method(descriptor: &str) -> Result<MethodShape, DescriptorError> {
    let parsed = MethodDescriptor::from_str(descriptor)?;
    Ok(MethodShape {
        parameter_types: parsed.parameter_types().iter().map(type_name).collect(),
        return_type: type_name(parsed.return_type()),
    })
}

/// Render a type descriptor the way Java source spells it.
pub fn type_name(descriptor: &TypeDescriptor) -> String {
    match descriptor {
        TypeDescriptor::Byte => "byte".to_string(),
        TypeDescriptor::Char => "char".to_string(),
        TypeDescriptor::Double => "double".to_string(),
        TypeDescriptor::Float => "float".to_string(),
        TypeDescriptor::Integer => "int".to_string(),
        TypeDescriptor::Long => "long".to_string(),
        TypeDescriptor::Short => "short".to_string(),
        TypeDescriptor::Boolean => "boolean".to_string(),
        TypeDescriptor::Void => "void".to_string(),
        TypeDescriptor::Array(base, dimensions) => {
            format!("{}{}", type_name(base), "[]".repeat(*dimensions as usize))
        }
        TypeDescriptor::Object(internal) => internal_to_dotted(internal),
    }
}

pub fn internal_to_dotted(internal: &str) -> String {
    internal.replace('/', ".")
}

/// Strip `L...;` from an annotation type descriptor and return the dotted name.
pub fn annotation_type_name(descriptor: &str) -> String {
    let trimmed = descriptor
        .strip_prefix('L')
        .and_then(|rest| rest.strip_suffix(';'))
        .unwrap_or(descriptor);
    internal_to_dotted(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_primitives_objects_and_arrays() {
        let shape = parse_method("(I[[Ljava/lang/String;J)[B").expect("parse descriptor");

        assert_eq!(
            shape.parameter_types,
            vec!["int", "java.lang.String[][]", "long"]
        );
        assert_eq!(shape.return_type, "byte[]");
    }

    #[test]
    fn void_no_arg_method() {
        let shape = parse_method("()V").expect("parse descriptor");

        assert!(shape.parameter_types.is_empty());
        assert_eq!(shape.return_type, "void");
    }

    #[test]
    fn rejects_malformed_descriptor() {
        assert!(parse_method("(Ljava/lang/String)V").is_err());
        assert!(parse_method("V").is_err());
    }

    #[test]
    fn annotation_descriptor_becomes_dotted_name() {
        assert_eq!(
            annotation_type_name("Ljavax/ws/rs/Path;"),
            "javax.ws.rs.Path"
        );
        assert_eq!(annotation_type_name("already.Dotted"), "already.Dotted");
    }
}
