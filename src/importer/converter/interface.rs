//! Interfaces and dispatch interfaces.
//!
//! Methods keep vtable order. Members of a base interface are not re-declared; the projection
//! implements the projection of its base instead. Accessor functions sharing a member id are
//! grouped into a property:
//!
//! | accessors              | methods                      | properties                    |
//! |------------------------|------------------------------|-------------------------------|
//! | get                    | `get_X`                      | `X` read-only                 |
//! | put or putref          | `set_X`                      | `X` write-only                |
//! | get, put               | `get_X`, `set_X`             | `X`                           |
//! | put and putref (+ get) | `let_X` (put), `set_X` (ref) | two `X`, the second `FHidden` |
//!
//! With both writers the primary property carries the writer that matches the property type
//! (`putref` for reference types, `put` for value types); the other one is attached to a
//! second property of the same name marked `TypeLibFunc(FHidden)`.

use std::collections::HashMap;

use crate::{
    importer::{
        attributes::{
            self, InteropAttribute, INTERFACE_IS_DUAL, INTERFACE_IS_IDISPATCH,
            INTERFACE_IS_IUNKNOWN,
        },
        context::{guid_argument, ImportContext, Target, TypeConverter},
        converter::{
            method::{emit_method, note_projection, shape_function, FunctionShape, ParamShape},
            type_def,
        },
        diagnostics::codes,
        naming::{or_fallback, NameScope},
        options::Transforms,
        resolver::WellKnown,
        typemap::{project, Usage},
    },
    metadata::{
        customattributes::CustomAttributeArgument,
        flags::{
            MethodAttributes, MethodImplAttributes, MethodSemanticsAttributes, ParamAttributes,
            TypeAttributes,
        },
        signatures::{SignatureMethod, SignatureParameter, SignatureProperty, TypeSignature},
        token::Token,
    },
    typelib::{FuncDesc, FuncFlags, FuncKind, InvokeKind, TypeFlags, TypeInfo, TypeKind, VarFlags},
    Result,
};

/// `DISPID_VALUE`, the default member.
const DISPID_VALUE: i32 = 0;

const ABSTRACT_METHOD: u16 = MethodAttributes::PUBLIC
    | MethodAttributes::VIRTUAL
    | MethodAttributes::HIDE_BY_SIG
    | MethodAttributes::NEW_SLOT
    | MethodAttributes::ABSTRACT;

/// Implementation flags of methods implemented by the runtime's COM interop layer.
pub const RUNTIME_IMPL: MethodImplAttributes =
    MethodImplAttributes::RUNTIME.union(MethodImplAttributes::INTERNAL_CALL);

/// Flags, attributes and base interfaces.
///
/// # Errors
/// Returns an error if a base interface cannot be resolved.
pub fn define(
    ctx: &mut ImportContext,
    output: usize,
    converter: &TypeConverter,
    info: TypeInfo<'_>,
) -> Result<()> {
    let token = type_def(converter)?;
    ctx.builder(output).set_type_flags(
        token,
        TypeAttributes::PUBLIC | TypeAttributes::INTERFACE | TypeAttributes::ABSTRACT,
    )?;

    attributes::attach(ctx, output, token, InteropAttribute::ComImport, Vec::new())?;
    attributes::attach(
        ctx,
        output,
        token,
        InteropAttribute::Guid,
        vec![guid_argument(info.guid())],
    )?;
    attributes::attach(
        ctx,
        output,
        token,
        InteropAttribute::InterfaceType,
        vec![CustomAttributeArgument::I2(interface_type(info))],
    )?;
    attributes::attach_flags(
        ctx,
        output,
        token,
        InteropAttribute::TypeLibType,
        info.flags().bits(),
    )?;
    if ctx.options.unsafe_interfaces {
        attributes::attach(
            ctx,
            output,
            token,
            InteropAttribute::SuppressUnmanagedCodeSecurity,
            Vec::new(),
        )?;
    }

    for implemented in info.impl_types() {
        let base = match ctx.resolve(info, implemented.href())? {
            Target::WellKnown(WellKnown::IUnknown | WellKnown::IDispatch) => continue,
            Target::WellKnown(WellKnown::IEnumVariant) => {
                ctx.framework_type(output, "System.Collections", "IEnumerator")
            }
            Target::WellKnown(WellKnown::Guid) => {
                return Err(malformed_error!(
                    "interface '{}' derives from a record",
                    converter.full_name()
                ))
            }
            Target::Converter(id) => ctx.type_token(output, id)?,
        };
        ctx.builder(output).add_interface_impl(token, base)?;
    }
    Ok(())
}

fn interface_type(info: TypeInfo<'_>) -> i16 {
    if info.kind() == TypeKind::Dispatch {
        INTERFACE_IS_IDISPATCH
    } else if info.flags().contains(TypeFlags::DUAL) {
        INTERFACE_IS_DUAL
    } else {
        INTERFACE_IS_IUNKNOWN
    }
}

/// Names already used by the members of one interface.
#[derive(Debug, Default)]
struct Members {
    methods: NameScope,
    properties: NameScope,
    default_member: Option<String>,
    lossy: bool,
}

#[derive(Debug, Default)]
struct Accessor {
    method: Option<Token>,
    shape: Option<FunctionShape>,
    flags: u16,
}

#[derive(Debug, Default)]
struct PropertyGroup {
    memid: i32,
    source_name: String,
    name: Option<String>,
    get: Option<Accessor>,
    put: Option<Accessor>,
    put_ref: Option<Accessor>,
}

/// Methods, properties and the default member.
///
/// # Errors
/// Returns an error if a member type cannot be resolved; the members emitted so far stay.
pub fn create(
    ctx: &mut ImportContext,
    output: usize,
    converter: &TypeConverter,
    info: TypeInfo<'_>,
) -> Result<()> {
    let token = type_def(converter)?;
    let mut members = Members::default();

    emit_members(ctx, output, token, converter, info, &mut members)?;

    if let Some(name) = members.default_member.take() {
        attributes::attach(
            ctx,
            output,
            token,
            InteropAttribute::DefaultMember,
            vec![CustomAttributeArgument::String(Some(name))],
        )?;
    }
    if members.lossy {
        attributes::attach(
            ctx,
            output,
            token,
            InteropAttribute::ComConversionLoss,
            Vec::new(),
        )?;
    }
    Ok(())
}

fn emit_members(
    ctx: &mut ImportContext,
    output: usize,
    token: Token,
    converter: &TypeConverter,
    info: TypeInfo<'_>,
    members: &mut Members,
) -> Result<()> {
    let mut funcs: Vec<FuncDesc<'_>> = info.functions().collect();
    if info.kind() != TypeKind::Dispatch {
        funcs.sort_by_key(FuncDesc::vtable_offset);
    }

    let mut groups: Vec<PropertyGroup> = Vec::new();
    let mut roles: Vec<Option<(usize, InvokeKind)>> = Vec::with_capacity(funcs.len());
    {
        let mut by_memid: HashMap<i32, usize> = HashMap::new();
        for func in &funcs {
            let kind = func.invoke_kind();
            if kind == InvokeKind::Func {
                roles.push(None);
                continue;
            }
            let group = *by_memid.entry(func.memid()).or_insert_with(|| {
                groups.push(PropertyGroup {
                    memid: func.memid(),
                    source_name: or_fallback(func.name(), || format!("Property{}", func.index())),
                    ..PropertyGroup::default()
                });
                groups.len() - 1
            });
            let slot = match kind {
                InvokeKind::PropertyGet => &mut groups[group].get,
                InvokeKind::PropertyPut => &mut groups[group].put,
                _ => &mut groups[group].put_ref,
            };
            if slot.is_some() {
                ctx.diagnostics.warning(
                    codes::UNSUPPORTED_FLAG,
                    format!(
                        "accessor '{}' of '{}' duplicates member id {}, emitted as a method",
                        func.name(),
                        converter.full_name(),
                        func.memid()
                    ),
                );
                roles.push(None);
                continue;
            }
            *slot = Some(Accessor::default());
            roles.push(Some((group, kind)));
        }
    }

    let retval_transform = ctx.options.transforms.contains(Transforms::DISPATCH_RETVAL);
    for (func, role) in funcs.iter().zip(roles) {
        if matches!(func.kind(), FuncKind::Static | FuncKind::NonVirtual) {
            ctx.diagnostics.warning(
                codes::UNSUPPORTED_FLAG,
                format!(
                    "function '{}' of '{}' is not virtual, projected as an interface method",
                    func.name(),
                    converter.full_name()
                ),
            );
        }

        let transform = func.kind() != FuncKind::Dispatch || retval_transform;
        let shape = shape_function(ctx, output, *func, true, transform)?;
        members.lossy |= shape.lossy;

        let (wanted, flags) = match role {
            None => (
                or_fallback(func.name(), || format!("Method{}", func.index())),
                ABSTRACT_METHOD,
            ),
            Some((group, kind)) => {
                let group = &mut groups[group];
                if group.name.is_none() {
                    group.name = Some(
                        members
                            .properties
                            .claim_reported(&group.source_name, &mut ctx.diagnostics),
                    );
                }
                let property = group.name.clone().unwrap_or_default();
                let prefix = match kind {
                    InvokeKind::PropertyGet => "get_",
                    InvokeKind::PropertyPut if group.put_ref.is_some() => "let_",
                    _ => "set_",
                };
                (
                    format!("{prefix}{property}"),
                    ABSTRACT_METHOD | MethodAttributes::SPECIAL_NAME,
                )
            }
        };

        let name = members
            .methods
            .claim_reported(&wanted, &mut ctx.diagnostics);
        let method = emit_method(ctx, output, token, &name, flags, RUNTIME_IMPL, &shape)?;
        if converter.dispatchable {
            attributes::attach(
                ctx,
                output,
                method,
                InteropAttribute::DispId,
                vec![CustomAttributeArgument::I4(func.memid())],
            )?;
        }
        attributes::attach_flags(
            ctx,
            output,
            method,
            InteropAttribute::TypeLibFunc,
            func.flags().bits(),
        )?;

        match role {
            None => {
                if func.memid() == DISPID_VALUE && members.default_member.is_none() {
                    members.default_member = Some(name);
                }
            }
            Some((group, kind)) => {
                let group = &mut groups[group];
                let slot = match kind {
                    InvokeKind::PropertyGet => &mut group.get,
                    InvokeKind::PropertyPut => &mut group.put,
                    _ => &mut group.put_ref,
                };
                *slot = Some(Accessor {
                    method: Some(method),
                    shape: Some(shape),
                    flags: func.flags().bits(),
                });
            }
        }
    }

    for group in groups {
        emit_property_group(ctx, output, token, converter, group, members)?;
    }

    if info.kind() == TypeKind::Dispatch {
        emit_dispatch_variables(ctx, output, token, converter, info, members)?;
    }
    Ok(())
}

fn emit_property_group(
    ctx: &mut ImportContext,
    output: usize,
    owner: Token,
    converter: &TypeConverter,
    group: PropertyGroup,
    members: &mut Members,
) -> Result<()> {
    let Some(name) = group.name.clone() else {
        return Ok(());
    };
    let get = group.get.filter(|accessor| accessor.method.is_some());
    let put = group.put.filter(|accessor| accessor.method.is_some());
    let put_ref = group.put_ref.filter(|accessor| accessor.method.is_some());

    let signature = match (&get, &put, &put_ref) {
        (Some(getter), _, _) => getter.shape.as_ref().map(getter_signature),
        (None, Some(writer), _) | (None, None, Some(writer)) => {
            writer.shape.as_ref().map(setter_signature)
        }
        (None, None, None) => None,
    };
    let Some(signature) = signature else {
        return Ok(());
    };

    if group.memid == DISPID_VALUE && members.default_member.is_none() {
        members.default_member = Some(name.clone());
    }

    match (put, put_ref) {
        (Some(put), Some(put_ref)) => {
            let (primary, secondary) = if signature.base.is_value_type() {
                (put, put_ref)
            } else {
                (put_ref, put)
            };
            emit_property(
                ctx,
                output,
                owner,
                converter,
                &name,
                group.memid,
                &signature,
                get.as_ref(),
                Some(&primary),
            )?;
            let hidden = emit_property(
                ctx,
                output,
                owner,
                converter,
                &name,
                group.memid,
                &signature,
                None,
                Some(&secondary),
            )?;
            attributes::attach_flags(
                ctx,
                output,
                hidden,
                InteropAttribute::TypeLibFunc,
                secondary.flags | FuncFlags::HIDDEN.bits(),
            )?;
        }
        (writer, other) => {
            emit_property(
                ctx,
                output,
                owner,
                converter,
                &name,
                group.memid,
                &signature,
                get.as_ref(),
                writer.as_ref().or(other.as_ref()),
            )?;
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn emit_property(
    ctx: &mut ImportContext,
    output: usize,
    owner: Token,
    converter: &TypeConverter,
    name: &str,
    memid: i32,
    signature: &SignatureProperty,
    getter: Option<&Accessor>,
    setter: Option<&Accessor>,
) -> Result<Token> {
    let builder = ctx.builder(output);
    let property = builder.add_property(owner, 0, name, signature)?;
    if let Some(method) = getter.and_then(|accessor| accessor.method) {
        builder.add_method_semantics(MethodSemanticsAttributes::GETTER, method, property)?;
    }
    if let Some(method) = setter.and_then(|accessor| accessor.method) {
        builder.add_method_semantics(MethodSemanticsAttributes::SETTER, method, property)?;
    }
    if converter.dispatchable {
        attributes::attach(
            ctx,
            output,
            property,
            InteropAttribute::DispId,
            vec![CustomAttributeArgument::I4(memid)],
        )?;
    }
    Ok(property)
}

fn getter_signature(shape: &FunctionShape) -> SignatureProperty {
    SignatureProperty {
        has_this: true,
        base: shape.signature.return_type.base.clone(),
        params: shape.signature.params.clone(),
    }
}

fn setter_signature(shape: &FunctionShape) -> SignatureProperty {
    let mut params = shape.signature.params.clone();
    let value = params.pop().map(|param| param.base).unwrap_or_default();
    SignatureProperty {
        has_this: true,
        base: value,
        params,
    }
}

/// Properties a dispatch interface declares as variables.
fn emit_dispatch_variables(
    ctx: &mut ImportContext,
    output: usize,
    owner: Token,
    converter: &TypeConverter,
    info: TypeInfo<'_>,
    members: &mut Members,
) -> Result<()> {
    for var in info.variables() {
        let source_name = or_fallback(var.name(), || format!("Property{}", var.index()));
        let member = format!("{}.{}", converter.full_name(), source_name);
        let projection = project(ctx, output, info, var.elem().type_desc(), Usage::Return)?;
        note_projection(ctx, &member, &projection, &mut members.lossy);

        let name = members
            .properties
            .claim_reported(&source_name, &mut ctx.diagnostics);
        let getter_name = members
            .methods
            .claim_reported(&format!("get_{name}"), &mut ctx.diagnostics);
        let getter = FunctionShape {
            signature: SignatureMethod {
                has_this: true,
                return_type: SignatureParameter::value(projection.signature.clone()),
                params: Vec::new(),
            },
            params: Vec::new(),
            return_native: projection.native.clone(),
            preserve_sig: false,
            lcid: None,
            lossy: projection.lossy,
        };
        let get = emit_method(
            ctx,
            output,
            owner,
            &getter_name,
            ABSTRACT_METHOD | MethodAttributes::SPECIAL_NAME,
            RUNTIME_IMPL,
            &getter,
        )?;
        attributes::attach(
            ctx,
            output,
            get,
            InteropAttribute::DispId,
            vec![CustomAttributeArgument::I4(var.memid())],
        )?;

        let mut set = None;
        if !var.flags().contains(VarFlags::READONLY) {
            let setter_name = members
                .methods
                .claim_reported(&format!("set_{name}"), &mut ctx.diagnostics);
            let setter = FunctionShape {
                signature: SignatureMethod {
                    has_this: true,
                    return_type: SignatureParameter::value(TypeSignature::Void),
                    params: vec![SignatureParameter::value(projection.signature.clone())],
                },
                params: vec![ParamShape {
                    name: "value".to_string(),
                    flags: ParamAttributes::IN,
                    native: projection.native.clone(),
                    default: None,
                }],
                return_native: None,
                preserve_sig: false,
                lcid: None,
                lossy: projection.lossy,
            };
            let method = emit_method(
                ctx,
                output,
                owner,
                &setter_name,
                ABSTRACT_METHOD | MethodAttributes::SPECIAL_NAME,
                RUNTIME_IMPL,
                &setter,
            )?;
            attributes::attach(
                ctx,
                output,
                method,
                InteropAttribute::DispId,
                vec![CustomAttributeArgument::I4(var.memid())],
            )?;
            set = Some(method);
        }

        let builder = ctx.builder(output);
        let property = builder.add_property(
            owner,
            0,
            &name,
            &SignatureProperty {
                has_this: true,
                base: projection.signature,
                params: Vec::new(),
            },
        )?;
        builder.add_method_semantics(MethodSemanticsAttributes::GETTER, get, property)?;
        if let Some(set) = set {
            builder.add_method_semantics(MethodSemanticsAttributes::SETTER, set, property)?;
        }
        attributes::attach(
            ctx,
            output,
            property,
            InteropAttribute::DispId,
            vec![CustomAttributeArgument::I4(var.memid())],
        )?;
        attributes::attach_flags(
            ctx,
            output,
            property,
            InteropAttribute::TypeLibVar,
            var.flags().bits(),
        )?;

        if var.memid() == DISPID_VALUE && members.default_member.is_none() {
            members.default_member = Some(name);
        }
    }
    Ok(())
}
