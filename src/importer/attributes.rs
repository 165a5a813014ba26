//! The interop custom attributes the importer attaches.
//!
//! Each attribute is referenced through a `MemberRef` to its constructor on a `TypeRef` scoped
//! to `mscorlib`. `ComImport`, `Serializable` and `PreserveSig` are pseudo-attributes; the
//! builder folds them into row flags, which is reported as `TI4002`.

use crate::{
    importer::{context::ImportContext, diagnostics::codes},
    metadata::{
        customattributes::{CustomAttributeArgument, CustomAttributeValue},
        signatures::{SignatureMethod, SignatureParameter, TypeSignature},
        token::Token,
    },
    Result,
};

const INTEROP: &str = "System.Runtime.InteropServices";

/// `ComInterfaceType.InterfaceIsDual`
pub const INTERFACE_IS_DUAL: i16 = 0;
/// `ComInterfaceType.InterfaceIsIUnknown`
pub const INTERFACE_IS_IUNKNOWN: i16 = 1;
/// `ComInterfaceType.InterfaceIsIDispatch`
pub const INTERFACE_IS_IDISPATCH: i16 = 2;
/// `ClassInterfaceType.None`
pub const CLASS_INTERFACE_NONE: i16 = 0;

/// Attributes emitted by the importer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteropAttribute {
    /// `Guid(string)`
    Guid,
    /// `ComImport()`, folded into `Import`
    ComImport,
    /// `InterfaceType(short)`
    InterfaceType,
    /// `TypeLibType(short)`
    TypeLibType,
    /// `TypeLibFunc(short)`
    TypeLibFunc,
    /// `TypeLibVar(short)`
    TypeLibVar,
    /// `DispId(int)`
    DispId,
    /// `ClassInterface(short)`
    ClassInterface,
    /// `ComSourceInterfaces(string)`
    ComSourceInterfaces,
    /// `ComEventInterface(Type, Type)`
    ComEventInterface,
    /// `ComConversionLoss()`
    ComConversionLoss,
    /// `LCIDConversion(int)`
    LcidConversion,
    /// `PreserveSig()`, folded into the implementation flags
    PreserveSig,
    /// `DefaultMember(string)`
    DefaultMember,
    /// `Serializable()`, folded into `Serializable`
    Serializable,
    /// `SuppressUnmanagedCodeSecurity()`
    SuppressUnmanagedCodeSecurity,
    /// `ImportedFromTypeLib(string)`
    ImportedFromTypeLib,
    /// `TypeLibVersion(int, int)`
    TypeLibVersion,
}

#[derive(Debug, Clone, Copy)]
enum Parameter {
    I2,
    I4,
    String,
    Type,
}

impl InteropAttribute {
    /// Namespace and name of the attribute type.
    #[must_use]
    pub fn type_name(self) -> (&'static str, &'static str) {
        match self {
            InteropAttribute::Guid => (INTEROP, "GuidAttribute"),
            InteropAttribute::ComImport => (INTEROP, "ComImportAttribute"),
            InteropAttribute::InterfaceType => (INTEROP, "InterfaceTypeAttribute"),
            InteropAttribute::TypeLibType => (INTEROP, "TypeLibTypeAttribute"),
            InteropAttribute::TypeLibFunc => (INTEROP, "TypeLibFuncAttribute"),
            InteropAttribute::TypeLibVar => (INTEROP, "TypeLibVarAttribute"),
            InteropAttribute::DispId => (INTEROP, "DispIdAttribute"),
            InteropAttribute::ClassInterface => (INTEROP, "ClassInterfaceAttribute"),
            InteropAttribute::ComSourceInterfaces => (INTEROP, "ComSourceInterfacesAttribute"),
            InteropAttribute::ComEventInterface => (INTEROP, "ComEventInterfaceAttribute"),
            InteropAttribute::ComConversionLoss => (INTEROP, "ComConversionLossAttribute"),
            InteropAttribute::LcidConversion => (INTEROP, "LCIDConversionAttribute"),
            InteropAttribute::PreserveSig => (INTEROP, "PreserveSigAttribute"),
            InteropAttribute::DefaultMember => ("System.Reflection", "DefaultMemberAttribute"),
            InteropAttribute::Serializable => ("System", "SerializableAttribute"),
            InteropAttribute::SuppressUnmanagedCodeSecurity => {
                ("System.Security", "SuppressUnmanagedCodeSecurityAttribute")
            }
            InteropAttribute::ImportedFromTypeLib => (INTEROP, "ImportedFromTypeLibAttribute"),
            InteropAttribute::TypeLibVersion => (INTEROP, "TypeLibVersionAttribute"),
        }
    }

    fn parameters(self) -> &'static [Parameter] {
        match self {
            InteropAttribute::ComImport
            | InteropAttribute::ComConversionLoss
            | InteropAttribute::PreserveSig
            | InteropAttribute::Serializable
            | InteropAttribute::SuppressUnmanagedCodeSecurity => &[],
            InteropAttribute::InterfaceType
            | InteropAttribute::TypeLibType
            | InteropAttribute::TypeLibFunc
            | InteropAttribute::TypeLibVar
            | InteropAttribute::ClassInterface => &[Parameter::I2],
            InteropAttribute::DispId | InteropAttribute::LcidConversion => &[Parameter::I4],
            InteropAttribute::TypeLibVersion => &[Parameter::I4, Parameter::I4],
            InteropAttribute::Guid
            | InteropAttribute::ComSourceInterfaces
            | InteropAttribute::DefaultMember
            | InteropAttribute::ImportedFromTypeLib => &[Parameter::String],
            InteropAttribute::ComEventInterface => &[Parameter::Type, Parameter::Type],
        }
    }
}

/// Attach `attribute` with constructor arguments `args` to `parent` in `output`.
///
/// # Errors
/// Returns an error if `parent` cannot carry custom attributes.
pub fn attach(
    ctx: &mut ImportContext,
    output: usize,
    parent: Token,
    attribute: InteropAttribute,
    args: Vec<CustomAttributeArgument>,
) -> Result<()> {
    let constructor = constructor(ctx, output, attribute)?;
    let folded = ctx
        .builder(output)
        .add_custom_attribute(parent, constructor, &CustomAttributeValue::new(args))?
        .is_none();

    if folded {
        ctx.diagnostics.info(
            codes::PSEUDO_ATTRIBUTE_FOLDED,
            format!("{} folded into the flags of {parent}", attribute.type_name().1),
        );
    }
    Ok(())
}

/// Attach a `short` flag attribute such as `TypeLibType`, skipped when `flags` is zero.
///
/// # Errors
/// See [`attach`].
pub fn attach_flags(
    ctx: &mut ImportContext,
    output: usize,
    parent: Token,
    attribute: InteropAttribute,
    flags: u16,
) -> Result<()> {
    if flags == 0 {
        return Ok(());
    }
    attach(
        ctx,
        output,
        parent,
        attribute,
        vec![CustomAttributeArgument::I2(i16::from_ne_bytes(flags.to_ne_bytes()))],
    )
}

fn constructor(ctx: &mut ImportContext, output: usize, attribute: InteropAttribute) -> Result<Token> {
    let params = attribute
        .parameters()
        .iter()
        .map(|parameter| {
            SignatureParameter::value(match parameter {
                Parameter::I2 => TypeSignature::I2,
                Parameter::I4 => TypeSignature::I4,
                Parameter::String => TypeSignature::String,
                Parameter::Type => TypeSignature::Class(ctx.framework_type(output, "System", "Type")),
            })
        })
        .collect();

    let (namespace, name) = attribute.type_name();
    let class = ctx.framework_type(output, namespace, name);
    ctx.builder(output).add_member_ref(
        class,
        ".ctor",
        &SignatureMethod {
            has_this: true,
            return_type: SignatureParameter::value(TypeSignature::Void),
            params,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        importer::options::ImportOptions,
        metadata::{reader::AssemblyImage, tables::TableId},
        test::factories,
    };

    fn context() -> (ImportContext, usize) {
        let mut ctx = ImportContext::new(ImportOptions::new().with_verbose(true)).unwrap();
        let library = ctx.resolver.add_library(factories::shapes_library());
        let output = ctx.import_library(library).unwrap();
        (ctx, output)
    }

    #[test]
    fn assembly_attributes_are_present() {
        let (ctx, output) = context();
        let image = AssemblyImage::from_bytes(ctx.outputs[output].builder.to_bytes().unwrap())
            .unwrap();
        let assembly = Token::from_parts(TableId::Assembly, 1);

        let guid = image
            .find_attribute(assembly, INTEROP, "GuidAttribute")
            .unwrap()
            .unwrap();
        assert_eq!(
            guid.string_argument().unwrap(),
            factories::SHAPES_LIBID.to_string().to_ascii_uppercase()
        );

        let version = image
            .find_attribute(assembly, INTEROP, "TypeLibVersionAttribute")
            .unwrap()
            .unwrap()
            .parse_value()
            .unwrap();
        assert_eq!(
            version.fixed_args,
            vec![CustomAttributeArgument::I4(1), CustomAttributeArgument::I4(2)]
        );

        let imported = image
            .find_attribute(assembly, INTEROP, "ImportedFromTypeLibAttribute")
            .unwrap()
            .unwrap();
        assert_eq!(imported.string_argument().as_deref(), Some("Shapes"));
    }

    #[test]
    fn pseudo_attributes_fold_and_report() {
        let (mut ctx, output) = context();
        let id = ctx.symbols.ids().next().unwrap();
        let token = ctx.type_token(output, id).unwrap();

        attach(&mut ctx, output, token, InteropAttribute::ComImport, vec![]).unwrap();
        assert_eq!(
            ctx.diagnostics
                .with_code(codes::PSEUDO_ATTRIBUTE_FOLDED)
                .count(),
            1
        );

        attach_flags(&mut ctx, output, token, InteropAttribute::TypeLibType, 0).unwrap();
        attach_flags(&mut ctx, output, token, InteropAttribute::TypeLibType, 0x10).unwrap();

        let image = AssemblyImage::from_bytes(ctx.outputs[output].builder.to_bytes().unwrap())
            .unwrap();
        let attributes = image.attributes_of(token).unwrap();
        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes[0].name, "TypeLibTypeAttribute");
        assert_eq!(
            attributes[0].parse_value().unwrap().fixed_args,
            vec![CustomAttributeArgument::I2(0x10)]
        );
    }
}
