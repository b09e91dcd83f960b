//! Raw structural facts from a JVM class-file image.

use anyhow::{Context, Result, bail};
use jclassfile::attributes::{Annotation, Attribute};
use jclassfile::class_file::{self, ClassFile, ClassFlags};
use jclassfile::constant_pool::ConstantPool;
use jclassfile::methods::{MethodFlags, MethodInfo};

use crate::descriptor::{annotation_type_name, internal_to_dotted};
use crate::ir::{ClassAccess, MethodAccess, RawClass, RawMethod};

pub fn read_class(data: &[u8]) -> Result<RawClass> {
    let class = class_file::parse(data).context("malformed class file")?;
    let pool = class.constant_pool();

    let name = class_name(pool, class.this_class()).context("this_class")?;
    let super_name = match class.super_class() {
        0 => None,
        index => Some(class_name(pool, index).context("super_class")?),
    };
    let interfaces = class
        .interfaces()
        .iter()
        .map(|index| class_name(pool, *index))
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("interfaces of {name}"))?;
    let methods = class
        .methods()
        .iter()
        .map(|method| read_method(pool, method))
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("methods of {name}"))?;

    Ok(RawClass {
        access: class_access(&class),
        annotations: annotations(pool, class.attributes())?,
        name,
        super_name,
        interfaces,
        methods,
    })
}

fn class_access(class: &ClassFile) -> ClassAccess {
    let flags = class.access_flags();
    ClassAccess {
        is_public: flags.contains(ClassFlags::ACC_PUBLIC),
        is_final: flags.contains(ClassFlags::ACC_FINAL),
        is_interface: flags.contains(ClassFlags::ACC_INTERFACE),
        is_abstract: flags.contains(ClassFlags::ACC_ABSTRACT),
        is_annotation: flags.contains(ClassFlags::ACC_ANNOTATION),
        is_enum: flags.contains(ClassFlags::ACC_ENUM),
        is_synthetic: flags.contains(ClassFlags::ACC_SYNTHETIC),
    }
}

fn read_method(pool: &[ConstantPool], method: &MethodInfo) -> Result<RawMethod> {
    let name = utf8(pool, method.name_index())?.to_string();
    let descriptor = utf8(pool, method.descriptor_index())?.to_string();
    let flags = method.access_flags();

    let mut signature = None;
    let mut exceptions = Vec::new();
    for attribute in method.attributes() {
        match attribute {
            Attribute::Signature { signature_index } => {
                signature = Some(utf8(pool, *signature_index)?.to_string());
            }
            Attribute::Exceptions {
                exception_index_table,
            } => {
                for index in exception_index_table {
                    exceptions.push(class_name(pool, *index)?);
                }
            }
            _ => {}
        }
    }

    Ok(RawMethod {
        access: MethodAccess {
            is_public: flags.contains(MethodFlags::ACC_PUBLIC),
            is_private: flags.contains(MethodFlags::ACC_PRIVATE),
            is_protected: flags.contains(MethodFlags::ACC_PROTECTED),
            is_static: flags.contains(MethodFlags::ACC_STATIC),
            is_final: flags.contains(MethodFlags::ACC_FINAL),
            is_abstract: flags.contains(MethodFlags::ACC_ABSTRACT),
            is_native: flags.contains(MethodFlags::ACC_NATIVE),
            is_synthetic: flags.contains(MethodFlags::ACC_SYNTHETIC),
            is_bridge: flags.contains(MethodFlags::ACC_BRIDGE),
            is_varargs: flags.contains(MethodFlags::ACC_VARARGS),
        },
        annotations: annotations(pool, method.attributes())
            .with_context(|| format!("annotations of {name}{descriptor}"))?,
        name,
        descriptor,
        signature,
        exceptions,
    })
}

/// Visible and invisible annotation type names, in that order.
fn annotations(pool: &[ConstantPool], attributes: &[Attribute]) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for attribute in attributes {
        let found: &[Annotation] = match attribute {
            Attribute::RuntimeVisibleAnnotations { annotations, .. }
            | Attribute::RuntimeInvisibleAnnotations { annotations } => annotations,
            _ => continue,
        };
        for annotation in found {
            names.push(annotation_type_name(utf8(pool, annotation.type_index())?));
        }
    }
    Ok(names)
}

fn utf8(pool: &[ConstantPool], index: u16) -> Result<&str> {
    match pool.get(usize::from(index)) {
        Some(ConstantPool::Utf8 { value }) => Ok(value.as_str()),
        Some(other) => bail!("constant #{index} is not UTF-8: {other:?}"),
        None => bail!("constant #{index} is out of range"),
    }
}

fn class_name(pool: &[ConstantPool], index: u16) -> Result<String> {
    match pool.get(usize::from(index)) {
        Some(ConstantPool::Class { name_index }) => Ok(internal_to_dotted(utf8(pool, *name_index)?)),
        Some(other) => bail!("constant #{index} is not a class: {other:?}"),
        None => bail!("constant #{index} is out of range"),
    }
}

/// Hand-assembled class files for tests.
#[cfg(test)]
pub(crate) mod fixture {
    pub struct ClassBuilder {
        pool: Vec<Vec<u8>>,
        access: u16,
        this_class: u16,
        super_class: u16,
        interfaces: Vec<u16>,
        methods: Vec<Vec<u8>>,
        attributes: Vec<Vec<u8>>,
    }

    impl ClassBuilder {
        /// `name` and `super_name` are internal names (`a/b/C`).
        pub fn new(name: &str, super_name: Option<&str>, access: u16) -> Self {
            let mut builder = Self {
                pool: Vec::new(),
                access,
                this_class: 0,
                super_class: 0,
                interfaces: Vec::new(),
                methods: Vec::new(),
                attributes: Vec::new(),
            };
            builder.this_class = builder.class(name);
            if let Some(super_name) = super_name {
                builder.super_class = builder.class(super_name);
            }
            builder
        }

        pub fn interface(mut self, name: &str) -> Self {
            let index = self.class(name);
            self.interfaces.push(index);
            self
        }

        pub fn annotation(mut self, descriptor: &str) -> Self {
            let attribute = self.annotations_attribute(descriptor);
            self.attributes.push(attribute);
            self
        }

        /// Method without a `Code` attribute; mark it abstract or native to be well formed.
        pub fn method(
            mut self,
            access: u16,
            name: &str,
            descriptor: &str,
            exceptions: &[&str],
            annotation: Option<&str>,
        ) -> Self {
            let name_index = self.utf8(name);
            let descriptor_index = self.utf8(descriptor);
            let mut attributes = Vec::new();
            if !exceptions.is_empty() {
                let attribute_name = self.utf8("Exceptions");
                let mut body = u16_bytes(exceptions.len() as u16);
                for exception in exceptions {
                    let index = self.class(exception);
                    body.extend(u16_bytes(index));
                }
                attributes.push(attribute(attribute_name, body));
            }
            if let Some(annotation) = annotation {
                attributes.push(self.annotations_attribute(annotation));
            }

            let mut method = u16_bytes(access);
            method.extend(u16_bytes(name_index));
            method.extend(u16_bytes(descriptor_index));
            method.extend(u16_bytes(attributes.len() as u16));
            for attribute in attributes {
                method.extend(attribute);
            }
            self.methods.push(method);
            self
        }

        pub fn build(self) -> Vec<u8> {
            let mut out = vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52];
            out.extend(u16_bytes(self.pool.len() as u16 + 1));
            for entry in &self.pool {
                out.extend(entry);
            }
            out.extend(u16_bytes(self.access));
            out.extend(u16_bytes(self.this_class));
            out.extend(u16_bytes(self.super_class));
            out.extend(u16_bytes(self.interfaces.len() as u16));
            for interface in &self.interfaces {
                out.extend(u16_bytes(*interface));
            }
            out.extend(u16_bytes(0));
            out.extend(u16_bytes(self.methods.len() as u16));
            for method in &self.methods {
                out.extend(method);
            }
            out.extend(u16_bytes(self.attributes.len() as u16));
            for attribute in &self.attributes {
                out.extend(attribute);
            }
            out
        }

        fn annotations_attribute(&mut self, descriptor: &str) -> Vec<u8> {
            let attribute_name = self.utf8("RuntimeVisibleAnnotations");
            let type_index = self.utf8(descriptor);
            let mut body = u16_bytes(1);
            body.extend(u16_bytes(type_index));
            body.extend(u16_bytes(0));
            attribute(attribute_name, body)
        }

        fn utf8(&mut self, value: &str) -> u16 {
            let mut entry = vec![1];
            entry.extend(u16_bytes(value.len() as u16));
            entry.extend(value.as_bytes());
            self.push(entry)
        }

        fn class(&mut self, name: &str) -> u16 {
            let name_index = self.utf8(name);
            let mut entry = vec![7];
            entry.extend(u16_bytes(name_index));
            self.push(entry)
        }

        fn push(&mut self, entry: Vec<u8>) -> u16 {
            self.pool.push(entry);
            self.pool.len() as u16
        }
    }

    fn attribute(name_index: u16, body: Vec<u8>) -> Vec<u8> {
        let mut out = u16_bytes(name_index);
        out.extend((body.len() as u32).to_be_bytes());
        out.extend(body);
        out
    }

    fn u16_bytes(value: u16) -> Vec<u8> {
        value.to_be_bytes().to_vec()
    }
}
