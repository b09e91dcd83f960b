/// Structural facts for one class, as delivered by the class-loading hook.
///
/// Names are dotted (`com.example.Foo`), never internal (`com/example/Foo`).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawClass {
    pub name: String,
    pub access: ClassAccess,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub annotations: Vec<String>,
    pub methods: Vec<RawMethod>,
}

/// Structural facts for one declared method.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawMethod {
    pub name: String,
    pub descriptor: String,
    pub access: MethodAccess,
    pub signature: Option<String>,
    pub exceptions: Vec<String>,
    pub annotations: Vec<String>,
}

/// Class access flags used for matching and composition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct ClassAccess {
    pub is_public: bool,
    pub is_final: bool,
    pub is_interface: bool,
    pub is_abstract: bool,
    pub is_annotation: bool,
    pub is_enum: bool,
    pub is_synthetic: bool,
}

/// Method access flags used for matching and override checks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct MethodAccess {
    pub is_public: bool,
    pub is_private: bool,
    pub is_protected: bool,
    pub is_static: bool,
    pub is_final: bool,
    pub is_abstract: bool,
    pub is_native: bool,
    pub is_synthetic: bool,
    pub is_bridge: bool,
    pub is_varargs: bool,
}

impl RawMethod {
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    pub fn is_static_initializer(&self) -> bool {
        self.name == "<clinit>"
    }
}

impl MethodAccess {
    /// Whether a subclass can see and override a method with these flags.
    pub fn is_overridable(&self) -> bool {
        !self.is_private && !self.is_static
    }

    /// Whether the method has a body the generator can weave into.
    pub fn has_body(&self) -> bool {
        !self.is_abstract && !self.is_native
    }
}
