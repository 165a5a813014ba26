//! Managed shapes of functions.
//!
//! A COM function becomes a managed method in one of two forms. When its last parameter is
//! `[out, retval]` and it returns `HRESULT`, the parameter becomes the managed return value
//! and failures surface as exceptions. Otherwise the declared return is kept and the method is
//! marked `PreserveSig`. `lcid` parameters are supplied by the runtime and are dropped in favor
//! of an `LCIDConversion` attribute.

use crate::{
    importer::{
        attributes::{self, InteropAttribute},
        context::ImportContext,
        diagnostics::codes,
        naming::{or_fallback, UNNAMED},
        typemap::{constant_from_variant, project, ConstantValue, Projection, Usage},
    },
    metadata::{
        customattributes::CustomAttributeArgument,
        flags::{MethodImplAttributes, ParamAttributes},
        marshalling::NativeType,
        signatures::{SignatureMethod, SignatureParameter},
        token::Token,
    },
    typelib::{ElemDesc, FuncDesc, FuncKind, ParamFlags, TypeDesc, VarType},
    Result,
};

/// One managed parameter.
#[derive(Debug, Clone)]
pub struct ParamShape {
    /// Parameter name
    pub name: String,
    /// `ParamAttributes`
    pub flags: u16,
    /// Marshalling descriptor
    pub native: Option<NativeType>,
    /// Default value
    pub default: Option<ConstantValue>,
}

/// The managed form of a function.
#[derive(Debug, Clone)]
pub struct FunctionShape {
    /// Method signature
    pub signature: SignatureMethod,
    /// Parameters in signature order
    pub params: Vec<ParamShape>,
    /// Marshalling descriptor of the return value
    pub return_native: Option<NativeType>,
    /// The native return is passed through unchanged
    pub preserve_sig: bool,
    /// Position of the dropped `lcid` parameter
    pub lcid: Option<usize>,
    /// A parameter or the return lost information
    pub lossy: bool,
}

/// Compute the managed form of `func` as seen from `output`.
///
/// `transform_retval` enables the `[out, retval]` rewrite. For dispatch functions it also
/// accepts a `void` return, since `IDispatch::Invoke` hides the `HRESULT`.
///
/// # Errors
/// Returns an error if a parameter type cannot be resolved.
pub fn shape_function(
    ctx: &mut ImportContext,
    output: usize,
    func: FuncDesc<'_>,
    has_this: bool,
    transform_retval: bool,
) -> Result<FunctionShape> {
    let owner = func.owner();
    let member = format!(
        "{}.{}",
        or_fallback(owner.name(), || UNNAMED.into()),
        or_fallback(func.name(), || UNNAMED.into())
    );
    let params: Vec<ElemDesc<'_>> = func.params().collect();
    let is_dispatch = func.kind() == FuncKind::Dispatch;
    let declared = func.ret().type_desc().vartype();

    let retval = params.len().checked_sub(1).filter(|last| {
        transform_retval
            && params[*last].flags().contains(ParamFlags::RETVAL)
            && (declared == VarType::HResult || (is_dispatch && declared == VarType::Void))
    });

    let mut lossy = false;
    let (return_type, preserve_sig) = match retval {
        Some(last) => {
            let pointee = match params[last].type_desc() {
                TypeDesc::Ptr(inner) => inner.as_ref(),
                other => other,
            };
            (project(ctx, output, owner, pointee, Usage::Return)?, false)
        }
        None => (
            project(ctx, output, owner, func.ret().type_desc(), Usage::Return)?,
            !is_dispatch,
        ),
    };
    note_projection(ctx, &member, &return_type, &mut lossy);

    let mut shape = FunctionShape {
        signature: SignatureMethod {
            has_this,
            return_type: SignatureParameter::value(return_type.signature),
            params: Vec::new(),
        },
        params: Vec::new(),
        return_native: return_type.native,
        preserve_sig,
        lcid: None,
        lossy: false,
    };

    for (position, elem) in params.iter().enumerate() {
        if Some(position) == retval {
            continue;
        }
        let flags = elem.flags();
        if flags.contains(ParamFlags::LCID) {
            shape.lcid = Some(shape.params.len());
            continue;
        }

        let name = or_fallback(elem.name().unwrap_or_default(), || {
            format!("param{}", position + 1)
        });
        let projection = project(ctx, output, owner, elem.type_desc(), Usage::Parameter)?;
        note_projection(ctx, &member, &projection, &mut lossy);

        let mut attributes = 0;
        if flags.contains(ParamFlags::IN) {
            attributes |= ParamAttributes::IN;
        }
        if flags.contains(ParamFlags::OUT) {
            attributes |= ParamAttributes::OUT;
        }
        if flags.intersects(ParamFlags::OPT | ParamFlags::HASDEFAULT) {
            attributes |= ParamAttributes::OPTIONAL;
        }

        let default = default_value(ctx, &member, &name, elem);
        shape.signature.params.push(SignatureParameter {
            by_ref: projection.by_ref,
            base: projection.signature,
        });
        shape.params.push(ParamShape {
            name,
            flags: attributes,
            native: projection.native,
            default,
        });
    }

    shape.lossy = lossy;
    Ok(shape)
}

/// Fold `projection` into `lossy` and report a replaced type as `TI2005`.
pub fn note_projection(
    ctx: &mut ImportContext,
    member: &str,
    projection: &Projection,
    lossy: &mut bool,
) {
    *lossy |= projection.lossy;
    if let Some(vt) = projection.replaced {
        ctx.diagnostics.warning(
            codes::TYPE_REPLACED,
            format!("type {vt} in '{member}' has no managed equivalent, replaced by IntPtr"),
        );
    }
}

fn default_value(
    ctx: &mut ImportContext,
    member: &str,
    param: &str,
    elem: &ElemDesc<'_>,
) -> Option<ConstantValue> {
    let value = elem.default_value()?;
    let flags = elem.flags();
    if !flags.contains(ParamFlags::HASDEFAULT) {
        // an optional parameter without hasdefault is plain [Optional]
        if !flags.contains(ParamFlags::OPT) {
            ctx.diagnostics.warning(
                codes::DEFAULT_AMBIGUOUS,
                format!(
                    "default value of parameter '{param}' of '{member}' ignored, the parameter is neither optional nor marked hasdefault"
                ),
            );
        }
        return None;
    }

    let constant = constant_from_variant(value);
    if constant.is_none() {
        ctx.diagnostics.warning(
            codes::DEFAULT_OMITTED,
            format!(
                "default value of parameter '{param}' of '{member}' ({}) cannot be represented",
                value.vartype()
            ),
        );
    }
    constant
}

/// Emit `shape` as method `name` of `owner`, with its parameter rows, marshalling, defaults,
/// `PreserveSig` and `LCIDConversion`.
///
/// # Errors
/// Returns an error if the builder rejects a row.
pub fn emit_method(
    ctx: &mut ImportContext,
    output: usize,
    owner: Token,
    name: &str,
    flags: u16,
    impl_flags: MethodImplAttributes,
    shape: &FunctionShape,
) -> Result<Token> {
    let builder = ctx.builder(output);
    let method = builder.add_method(owner, flags, impl_flags, name, &shape.signature)?;

    if let Some(native) = &shape.return_native {
        let ret = builder.add_param(method, 0, 0, "")?;
        builder.add_field_marshal(ret, native)?;
    }

    for (sequence, param) in (1_u16..).zip(&shape.params) {
        let row = builder.add_param(method, param.flags, sequence, &param.name)?;
        if let Some(native) = &param.native {
            builder.add_field_marshal(row, native)?;
        }
        if let Some(default) = &param.default {
            builder.add_constant(row, default.element_type, &default.bytes)?;
        }
    }

    if shape.preserve_sig {
        attributes::attach(ctx, output, method, InteropAttribute::PreserveSig, Vec::new())?;
    }
    if let Some(position) = shape.lcid {
        attributes::attach(
            ctx,
            output,
            method,
            InteropAttribute::LcidConversion,
            vec![CustomAttributeArgument::I4(
                i32::try_from(position).unwrap_or(i32::MAX),
            )],
        )?;
    }
    Ok(method)
}
