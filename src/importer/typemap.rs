//! Projection of type descriptors onto managed signatures.
//!
//! [`project`] turns a `TYPEDESC` into the managed signature element, the by-ref flag and the
//! `FieldMarshal` descriptor that preserve the native layout. The result depends on where the
//! type is used: `void` is only legal as a return, and a pointer to a non-interface type is a
//! by-ref parameter but an opaque `IntPtr` anywhere else.
//!
//! Constants are projected separately by [`constant_from_variant`] and [`integral_constant`].

use crate::{
    importer::{
        context::{ImportContext, ManagedKind, Target},
        converter::coclass,
        resolver::WellKnown,
        symbols::ConverterId,
    },
    metadata::{
        marshalling::NativeType,
        signatures::{TypeSignature, ELEMENT_TYPE},
    },
    typelib::{HRefType, TypeDesc, TypeInfo, TypeKind, VarType, Variant},
    Error, Result,
};

/// Longest alias chain followed before it is reported as a cycle.
pub const MAX_ALIAS_DEPTH: usize = 64;

/// Where a projected type appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usage {
    /// Method parameter
    Parameter,
    /// Method return value
    Return,
    /// Field of a record, union or module
    Field,
    /// Element of an array
    Element,
}

/// A projected type.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    /// The managed signature element
    pub signature: TypeSignature,
    /// Passed by reference; parameters only
    pub by_ref: bool,
    /// Marshalling descriptor, when the default marshalling would not match
    pub native: Option<NativeType>,
    /// `VARTYPE` of the value inside a `SAFEARRAY`
    pub variant_type: VarType,
    /// Information was lost, the owner is marked `ComConversionLoss`
    pub lossy: bool,
    /// The source type had no projection and was replaced by `IntPtr`
    pub replaced: Option<VarType>,
}

impl Projection {
    fn plain(signature: TypeSignature, variant_type: VarType) -> Self {
        Projection {
            signature,
            by_ref: false,
            native: None,
            variant_type,
            lossy: false,
            replaced: None,
        }
    }

    fn marshalled(signature: TypeSignature, native: NativeType, variant_type: VarType) -> Self {
        Projection {
            native: Some(native),
            ..Projection::plain(signature, variant_type)
        }
    }

    fn int_ptr(replaced: Option<VarType>, lossy: bool) -> Self {
        Projection {
            lossy,
            replaced,
            ..Projection::plain(TypeSignature::I, VarType::IntPtr)
        }
    }

    /// `true` for projections of interface pointers.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        matches!(
            self.native,
            Some(NativeType::Interface { .. } | NativeType::IUnknown | NativeType::IDispatch)
        )
    }
}

/// Project `desc`, declared by `owner`, for use inside `output`.
///
/// # Errors
/// Returns [`Error::RefNotFound`] or [`Error::MissingDependency`] for unresolvable user-defined
/// types and [`Error::AliasCycle`] for alias chains longer than [`MAX_ALIAS_DEPTH`].
pub fn project(
    ctx: &mut ImportContext,
    output: usize,
    owner: TypeInfo<'_>,
    desc: &TypeDesc,
    usage: Usage,
) -> Result<Projection> {
    project_at(ctx, output, owner, desc, usage, 0)
}

fn project_at(
    ctx: &mut ImportContext,
    output: usize,
    owner: TypeInfo<'_>,
    desc: &TypeDesc,
    usage: Usage,
    depth: usize,
) -> Result<Projection> {
    match desc {
        TypeDesc::Base(vt) => Ok(base(ctx, output, *vt, usage)),
        TypeDesc::Ptr(inner) => pointer(ctx, output, owner, inner, usage, depth),
        TypeDesc::SafeArray(inner) => {
            let element = project_at(ctx, output, owner, inner, Usage::Element, depth)?;
            Ok(Projection {
                signature: TypeSignature::SzArray(Box::new(element.signature)),
                by_ref: false,
                native: Some(NativeType::SafeArray {
                    variant_type: element.variant_type as u16,
                    user_defined_name: None,
                }),
                variant_type: VarType::SafeArray,
                lossy: element.lossy,
                replaced: element.replaced,
            })
        }
        TypeDesc::CArray(array) => {
            let element = project_at(ctx, output, owner, &array.element, Usage::Element, depth)?;
            Ok(Projection {
                signature: TypeSignature::SzArray(Box::new(element.signature)),
                by_ref: false,
                native: Some(NativeType::FixedArray {
                    size: array.total_elements(),
                    element_type: element.native.map(Box::new),
                }),
                variant_type: VarType::CArray,
                lossy: element.lossy,
                replaced: element.replaced,
            })
        }
        TypeDesc::UserDefined(href) => user_defined(ctx, output, owner, *href, usage, depth),
    }
}

fn base(ctx: &mut ImportContext, output: usize, vt: VarType, usage: Usage) -> Projection {
    match vt {
        VarType::I1 => Projection::plain(TypeSignature::I1, vt),
        VarType::I2 => Projection::plain(TypeSignature::I2, vt),
        VarType::I4 | VarType::Int => Projection::plain(TypeSignature::I4, vt),
        VarType::I8 => Projection::plain(TypeSignature::I8, vt),
        VarType::UI1 => Projection::plain(TypeSignature::U1, vt),
        VarType::UI2 => Projection::plain(TypeSignature::U2, vt),
        VarType::UI4 | VarType::UInt => Projection::plain(TypeSignature::U4, vt),
        VarType::UI8 => Projection::plain(TypeSignature::U8, vt),
        VarType::R4 => Projection::plain(TypeSignature::R4, vt),
        VarType::R8 => Projection::plain(TypeSignature::R8, vt),
        VarType::IntPtr => Projection::plain(TypeSignature::I, vt),
        VarType::UIntPtr => Projection::plain(TypeSignature::U, vt),
        VarType::Bool => {
            Projection::marshalled(TypeSignature::Boolean, NativeType::VariantBool, vt)
        }
        VarType::Bstr => Projection::marshalled(TypeSignature::String, NativeType::BStr, vt),
        VarType::LpStr => Projection::marshalled(
            TypeSignature::String,
            NativeType::LPStr {
                size_param_index: None,
            },
            vt,
        ),
        VarType::LpWStr => Projection::marshalled(
            TypeSignature::String,
            NativeType::LPWStr {
                size_param_index: None,
            },
            vt,
        ),
        VarType::HResult | VarType::Error => {
            Projection::marshalled(TypeSignature::I4, NativeType::Error, vt)
        }
        VarType::Variant => Projection::marshalled(
            TypeSignature::Object,
            NativeType::Struct {
                packing_size: None,
                class_size: None,
            },
            vt,
        ),
        VarType::Unknown => Projection::marshalled(TypeSignature::Object, NativeType::IUnknown, vt),
        VarType::Dispatch => {
            Projection::marshalled(TypeSignature::Object, NativeType::IDispatch, vt)
        }
        VarType::Date => Projection::plain(
            TypeSignature::ValueType(ctx.framework_type(output, "System", "DateTime")),
            vt,
        ),
        VarType::Cy => Projection::marshalled(
            TypeSignature::ValueType(ctx.framework_type(output, "System", "Decimal")),
            NativeType::Currency,
            vt,
        ),
        VarType::Decimal => Projection::plain(
            TypeSignature::ValueType(ctx.framework_type(output, "System", "Decimal")),
            vt,
        ),
        VarType::Clsid => Projection::plain(
            TypeSignature::ValueType(ctx.framework_type(output, "System", "Guid")),
            VarType::Record,
        ),
        VarType::Void if usage == Usage::Return => Projection::plain(TypeSignature::Void, vt),
        other => Projection::int_ptr(Some(other), false),
    }
}

fn pointer(
    ctx: &mut ImportContext,
    output: usize,
    owner: TypeInfo<'_>,
    inner: &TypeDesc,
    usage: Usage,
    depth: usize,
) -> Result<Projection> {
    if matches!(inner, TypeDesc::Base(VarType::Void)) {
        return Ok(Projection::plain(TypeSignature::I, VarType::IntPtr));
    }

    let pointee = project_at(ctx, output, owner, inner, Usage::Element, depth)?;
    if matches!(inner, TypeDesc::UserDefined(_)) && pointee.is_interface() {
        return Ok(pointee);
    }

    if usage == Usage::Parameter && !pointee.by_ref {
        return Ok(Projection {
            by_ref: true,
            ..pointee
        });
    }

    Ok(Projection {
        replaced: pointee.replaced,
        ..Projection::int_ptr(None, true)
    })
}

fn user_defined(
    ctx: &mut ImportContext,
    output: usize,
    owner: TypeInfo<'_>,
    href: HRefType,
    usage: Usage,
    depth: usize,
) -> Result<Projection> {
    match ctx.resolve(owner, href)? {
        Target::WellKnown(known) => Ok(well_known(ctx, output, known)),
        Target::Converter(id) => converted(ctx, output, id, usage, depth),
    }
}

/// The projection of a well-known `stdole` type.
pub fn well_known(ctx: &mut ImportContext, output: usize, known: WellKnown) -> Projection {
    match known {
        WellKnown::IUnknown => {
            Projection::marshalled(TypeSignature::Object, NativeType::IUnknown, VarType::Unknown)
        }
        WellKnown::IDispatch => Projection::marshalled(
            TypeSignature::Object,
            NativeType::IDispatch,
            VarType::Dispatch,
        ),
        WellKnown::IEnumVariant => Projection::marshalled(
            TypeSignature::Class(ctx.framework_type(output, "System.Collections", "IEnumerator")),
            NativeType::Interface {
                iid_param_index: None,
            },
            VarType::Unknown,
        ),
        WellKnown::Guid => Projection::plain(
            TypeSignature::ValueType(ctx.framework_type(output, "System", "Guid")),
            VarType::Record,
        ),
    }
}

fn converted(
    ctx: &mut ImportContext,
    output: usize,
    id: ConverterId,
    usage: Usage,
    depth: usize,
) -> Result<Projection> {
    let converter = ctx.converter(id)?.clone();
    let source_kind = converter.source.map(|source| source.kind);

    match converter.managed {
        ManagedKind::Enum => Ok(Projection::plain(
            TypeSignature::ValueType(ctx.type_token(output, id)?),
            VarType::I4,
        )),
        ManagedKind::Struct => Ok(Projection::plain(
            TypeSignature::ValueType(ctx.type_token(output, id)?),
            VarType::Record,
        )),
        ManagedKind::Interface => Ok(Projection::marshalled(
            TypeSignature::Class(ctx.type_token(output, id)?),
            NativeType::Interface {
                iid_param_index: None,
            },
            if converter.dispatchable {
                VarType::Dispatch
            } else {
                VarType::Unknown
            },
        )),
        ManagedKind::Class if source_kind == Some(TypeKind::CoClass) => {
            match coclass::default_interface(ctx, id)? {
                Some(Target::Converter(interface)) => converted(ctx, output, interface, usage, depth),
                Some(Target::WellKnown(known)) => Ok(well_known(ctx, output, known)),
                None => Ok(well_known(ctx, output, WellKnown::IUnknown)),
            }
        }
        ManagedKind::Class if source_kind == Some(TypeKind::Module) => {
            Ok(Projection::int_ptr(Some(VarType::UserDefined), false))
        }
        ManagedKind::Class => Ok(Projection::marshalled(
            TypeSignature::Class(ctx.type_token(output, id)?),
            NativeType::Interface {
                iid_param_index: None,
            },
            VarType::Unknown,
        )),
        ManagedKind::Alias => {
            if depth >= MAX_ALIAS_DEPTH {
                return Err(Error::AliasCycle(converter.full_name()));
            }
            let (lib, source) = ctx.source(id)?;
            let info = lib.type_info(source.index)?;
            let Some(target) = info.alias() else {
                return Err(malformed_error!("alias '{}' has no target", converter.name));
            };
            project_at(ctx, output, info, target, usage, depth + 1)
        }
    }
}

/// A `Constant` row value: element type and little-endian bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantValue {
    /// `ELEMENT_TYPE_*` of the value
    pub element_type: u8,
    /// Encoded value
    pub bytes: Vec<u8>,
}

/// Encode `value` as a constant, `None` for forms a `Constant` row cannot hold (currency,
/// dates, decimals and empty or null values).
#[must_use]
pub fn constant_from_variant(value: &Variant) -> Option<ConstantValue> {
    let (element_type, bytes) = match value {
        Variant::I1(v) => (ELEMENT_TYPE::I1, v.to_le_bytes().to_vec()),
        Variant::I2(v) => (ELEMENT_TYPE::I2, v.to_le_bytes().to_vec()),
        Variant::I4(v) | Variant::Int(v) | Variant::Error(v) => {
            (ELEMENT_TYPE::I4, v.to_le_bytes().to_vec())
        }
        Variant::I8(v) => (ELEMENT_TYPE::I8, v.to_le_bytes().to_vec()),
        Variant::UI1(v) => (ELEMENT_TYPE::U1, vec![*v]),
        Variant::UI2(v) => (ELEMENT_TYPE::U2, v.to_le_bytes().to_vec()),
        Variant::UI4(v) | Variant::UInt(v) => (ELEMENT_TYPE::U4, v.to_le_bytes().to_vec()),
        Variant::UI8(v) => (ELEMENT_TYPE::U8, v.to_le_bytes().to_vec()),
        Variant::R4(v) => (ELEMENT_TYPE::R4, v.to_le_bytes().to_vec()),
        Variant::R8(v) => (ELEMENT_TYPE::R8, v.to_le_bytes().to_vec()),
        Variant::Bool(v) => (ELEMENT_TYPE::BOOLEAN, vec![u8::from(*v)]),
        Variant::Bstr(Some(text)) => (
            ELEMENT_TYPE::STRING,
            text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
        ),
        // a null reference constant is a CLASS element with a 4 byte zero value
        Variant::Bstr(None) => (ELEMENT_TYPE::CLASS, vec![0; 4]),
        Variant::Cy(_)
        | Variant::Date(_)
        | Variant::Decimal(_)
        | Variant::Empty
        | Variant::Null => return None,
    };
    Some(ConstantValue {
        element_type,
        bytes,
    })
}

/// Encode `value` as a constant of the integral signature `signature`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn integral_constant(signature: &TypeSignature, value: i64) -> Option<ConstantValue> {
    let (element_type, bytes) = match signature {
        TypeSignature::I1 => (ELEMENT_TYPE::I1, (value as i8).to_le_bytes().to_vec()),
        TypeSignature::U1 => (ELEMENT_TYPE::U1, vec![value as u8]),
        TypeSignature::I2 => (ELEMENT_TYPE::I2, (value as i16).to_le_bytes().to_vec()),
        TypeSignature::U2 => (ELEMENT_TYPE::U2, (value as u16).to_le_bytes().to_vec()),
        TypeSignature::I4 => (ELEMENT_TYPE::I4, (value as i32).to_le_bytes().to_vec()),
        TypeSignature::U4 => (ELEMENT_TYPE::U4, (value as u32).to_le_bytes().to_vec()),
        TypeSignature::I8 => (ELEMENT_TYPE::I8, value.to_le_bytes().to_vec()),
        TypeSignature::U8 => (ELEMENT_TYPE::U8, (value as u64).to_le_bytes().to_vec()),
        _ => return None,
    };
    Some(ConstantValue {
        element_type,
        bytes,
    })
}

/// `true` if `value` is representable in the integral `signature` without loss.
#[must_use]
pub fn fits_integral(signature: &TypeSignature, value: i64) -> bool {
    match signature {
        TypeSignature::I1 => i8::try_from(value).is_ok(),
        TypeSignature::U1 => u8::try_from(value).is_ok(),
        TypeSignature::I2 => i16::try_from(value).is_ok(),
        TypeSignature::U2 => u16::try_from(value).is_ok(),
        TypeSignature::I4 => i32::try_from(value).is_ok(),
        TypeSignature::U4 => u32::try_from(value).is_ok(),
        TypeSignature::I8 => true,
        TypeSignature::U8 => value >= 0,
        _ => false,
    }
}

/// The integral signature of an enum whose constants have type `vt`, defaulting to `int`.
#[must_use]
pub fn enum_underlying(vt: VarType) -> TypeSignature {
    match vt {
        VarType::I1 => TypeSignature::I1,
        VarType::UI1 => TypeSignature::U1,
        VarType::I2 => TypeSignature::I2,
        VarType::UI2 => TypeSignature::U2,
        VarType::UI4 | VarType::UInt => TypeSignature::U4,
        VarType::I8 => TypeSignature::I8,
        VarType::UI8 => TypeSignature::U8,
        _ => TypeSignature::I4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        importer::options::ImportOptions,
        metadata::tables::TableId,
        test::factories,
    };

    fn setup() -> (ImportContext, usize, usize) {
        let mut ctx = ImportContext::new(ImportOptions::new()).unwrap();
        let library = ctx.resolver.add_library(factories::shapes_library());
        let output = ctx.import_library(library).unwrap();
        (ctx, output, library)
    }

    fn project_named(
        ctx: &mut ImportContext,
        output: usize,
        library: usize,
        owner: &str,
        desc: &TypeDesc,
        usage: Usage,
    ) -> Result<Projection> {
        let lib = ctx.library(library).unwrap();
        let info = lib.find_by_name(owner).unwrap();
        project(ctx, output, info, desc, usage)
    }

    #[test]
    fn automation_primitives() {
        let (mut ctx, output, library) = setup();
        let mut base = |vt, usage| {
            project_named(&mut ctx, output, library, "IShape", &TypeDesc::Base(vt), usage)
                .unwrap()
        };

        let bstr = base(VarType::Bstr, Usage::Parameter);
        assert_eq!(bstr.signature, TypeSignature::String);
        assert_eq!(bstr.native, Some(NativeType::BStr));

        let boolean = base(VarType::Bool, Usage::Field);
        assert_eq!(boolean.signature, TypeSignature::Boolean);
        assert_eq!(boolean.native, Some(NativeType::VariantBool));

        let variant = base(VarType::Variant, Usage::Parameter);
        assert_eq!(variant.signature, TypeSignature::Object);
        assert!(matches!(variant.native, Some(NativeType::Struct { .. })));

        let currency = base(VarType::Cy, Usage::Return);
        assert!(matches!(currency.signature, TypeSignature::ValueType(_)));
        assert_eq!(currency.native, Some(NativeType::Currency));

        assert_eq!(base(VarType::Int, Usage::Field).signature, TypeSignature::I4);
        assert_eq!(base(VarType::UInt, Usage::Field).signature, TypeSignature::U4);
        assert_eq!(base(VarType::HResult, Usage::Return).native, Some(NativeType::Error));
        assert_eq!(base(VarType::Void, Usage::Return).signature, TypeSignature::Void);
    }

    #[test]
    fn void_outside_returns_is_replaced() {
        let (mut ctx, output, library) = setup();
        let projection = project_named(
            &mut ctx,
            output,
            library,
            "IShape",
            &TypeDesc::Base(VarType::Void),
            Usage::Field,
        )
        .unwrap();
        assert_eq!(projection.signature, TypeSignature::I);
        assert_eq!(projection.replaced, Some(VarType::Void));
    }

    #[test]
    fn pointers_depend_on_usage() {
        let (mut ctx, output, library) = setup();
        let int_ptr = TypeDesc::ptr(TypeDesc::Base(VarType::I4));

        let param = project_named(&mut ctx, output, library, "IShape", &int_ptr, Usage::Parameter)
            .unwrap();
        assert!(param.by_ref);
        assert_eq!(param.signature, TypeSignature::I4);

        let field =
            project_named(&mut ctx, output, library, "IShape", &int_ptr, Usage::Field).unwrap();
        assert!(!field.by_ref);
        assert!(field.lossy);
        assert_eq!(field.signature, TypeSignature::I);

        let void_ptr = TypeDesc::ptr(TypeDesc::Base(VarType::Void));
        let opaque =
            project_named(&mut ctx, output, library, "IShape", &void_ptr, Usage::Field).unwrap();
        assert_eq!(opaque.signature, TypeSignature::I);
        assert!(!opaque.lossy);
    }

    #[test]
    fn user_defined_types_use_their_tokens() {
        let (mut ctx, output, library) = setup();
        let lib = ctx.library(library).unwrap();
        let shape = lib.find_by_name("IShape").unwrap();
        let color = lib.find_by_name("Color").unwrap();

        let interface_ptr = TypeDesc::ptr(TypeDesc::UserDefined(HRefType::local(shape.index())));
        let projection =
            project(&mut ctx, output, shape, &interface_ptr, Usage::Parameter).unwrap();
        assert!(!projection.by_ref);
        match projection.signature {
            TypeSignature::Class(token) => assert_eq!(token.table_id(), Some(TableId::TypeDef)),
            other => panic!("unexpected {other:?}"),
        }

        let array = TypeDesc::safearray(TypeDesc::UserDefined(HRefType::local(color.index())));
        let projection = project(&mut ctx, output, shape, &array, Usage::Parameter).unwrap();
        assert!(matches!(projection.signature, TypeSignature::SzArray(_)));
        assert_eq!(
            projection.native,
            Some(NativeType::SafeArray {
                variant_type: VarType::I4 as u16,
                user_defined_name: None,
            })
        );
    }

    #[test]
    fn aliases_resolve_to_targets() {
        let (mut ctx, output, library) = setup();
        let lib = ctx.library(library).unwrap();
        let owner = lib.find_by_name("IShape").unwrap();
        let alias = lib.find_by_name("SHAPE_ID").unwrap();

        let projection = project(
            &mut ctx,
            output,
            owner,
            &TypeDesc::UserDefined(HRefType::local(alias.index())),
            Usage::Field,
        )
        .unwrap();
        assert_eq!(projection.signature, TypeSignature::I4);
    }

    #[test]
    fn constants() {
        let bstr = constant_from_variant(&Variant::Bstr(Some("ab".into()))).unwrap();
        assert_eq!(bstr.element_type, ELEMENT_TYPE::STRING);
        assert_eq!(bstr.bytes, vec![b'a', 0, b'b', 0]);

        let flag = constant_from_variant(&Variant::Bool(true)).unwrap();
        assert_eq!(flag.bytes, vec![1]);

        assert!(constant_from_variant(&Variant::Cy(10_000)).is_none());
        assert!(constant_from_variant(&Variant::Empty).is_none());

        let narrow = integral_constant(&TypeSignature::U2, 0x1_0005).unwrap();
        assert_eq!(narrow.bytes, vec![5, 0]);
        assert!(integral_constant(&TypeSignature::String, 1).is_none());
        assert_eq!(enum_underlying(VarType::UI1), TypeSignature::U1);
        assert_eq!(enum_underlying(VarType::Bstr), TypeSignature::I4);
    }

    #[test]
    fn integral_ranges() {
        assert!(fits_integral(&TypeSignature::I2, -32768));
        assert!(!fits_integral(&TypeSignature::I2, 70000));
        assert!(!fits_integral(&TypeSignature::U4, -1));
        assert!(fits_integral(&TypeSignature::I8, i64::MIN));
        assert!(!fits_integral(&TypeSignature::String, 0));
    }
}
