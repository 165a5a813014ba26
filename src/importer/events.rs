//! Event support for coclasses with source interfaces.
//!
//! For every source interface `S` of a coclass `C` the importer generates:
//!
//! - one delegate `S_MEventHandler` per method `M` of `S`,
//! - a sink helper `S_SinkHelper` implementing `S` that forwards calls to those delegates,
//! - a nested `C+C_EventProvider` holding the connection point state,
//! - on `C`, an event per method with `add_`/`remove_` accessors and a `ComEventInterface`
//!   attribute naming `S` and the provider.
//!
//! Delegates and sink helpers depend only on `S`, so they are generated once per output and
//! shared between coclasses sourcing the same interface.

use crate::{
    importer::{
        attributes::{self, InteropAttribute},
        context::{ImportContext, Target, TypeConverter},
        converter::{
            interface::RUNTIME_IMPL,
            method::{emit_method, shape_function, FunctionShape},
            type_def,
        },
        diagnostics::codes,
        naming::{or_fallback, NameScope},
        options::Transforms,
        symbols::ConverterId,
    },
    metadata::{
        customattributes::CustomAttributeArgument,
        flags::{
            FieldAttributes, MethodAttributes, MethodImplAttributes, MethodSemanticsAttributes,
            ParamAttributes, TypeAttributes,
        },
        signatures::{SignatureField, SignatureMethod, SignatureParameter, TypeSignature},
        token::Token,
    },
    typelib::{FuncDesc, FuncKind, ImplTypeFlags, InvokeKind, TypeInfo, TypeKind},
    Result,
};

/// Delegate generated for one method of a source interface.
#[derive(Debug, Clone)]
pub struct EventMethod {
    /// Name of the source method, also the event name
    pub name: String,
    /// The delegate `TypeDef`
    pub delegate: Token,
}

/// The generated types backing one source interface in one output.
#[derive(Debug, Clone)]
pub struct EventSink {
    /// The `S_SinkHelper` `TypeDef`
    pub helper: Token,
    /// One delegate per source method, in vtable order
    pub methods: Vec<EventMethod>,
}

const CONSTRUCTOR: u16 = MethodAttributes::PUBLIC
    | MethodAttributes::HIDE_BY_SIG
    | MethodAttributes::SPECIAL_NAME
    | MethodAttributes::RT_SPECIAL_NAME;

const ACCESSOR: u16 = MethodAttributes::PUBLIC
    | MethodAttributes::VIRTUAL
    | MethodAttributes::HIDE_BY_SIG
    | MethodAttributes::NEW_SLOT
    | MethodAttributes::SPECIAL_NAME;

/// Generate the events of `coclass`, described by `info`.
///
/// # Errors
/// Returns an error if a source interface cannot be projected.
pub fn synthesize(
    ctx: &mut ImportContext,
    output: usize,
    coclass: &TypeConverter,
    info: TypeInfo<'_>,
) -> Result<()> {
    let class = type_def(coclass)?;

    let mut sources: Vec<(bool, ConverterId)> = Vec::new();
    for implemented in info.impl_types() {
        let flags = implemented.flags();
        if !flags.contains(ImplTypeFlags::SOURCE) {
            continue;
        }
        if let Target::Converter(source) = ctx.resolve(info, implemented.href())? {
            sources.push((flags.contains(ImplTypeFlags::DEFAULT), source));
        }
    }
    if sources.is_empty() {
        return Ok(());
    }
    // the default source interface goes first
    sources.sort_by_key(|(default, _)| !*default);

    let (provider, provider_name) = provider(ctx, output, coclass, class)?;
    let mut names = NameScope::new();
    let mut described = false;

    for (_, source) in sources {
        let converter = ctx.converter(source)?.clone();
        if converter.source.is_none() {
            ctx.diagnostics.warning(
                codes::UNSUPPORTED_FLAG,
                format!(
                    "source interface '{}' of '{}' comes from a reference assembly, no events generated",
                    converter.full_name(),
                    coclass.full_name()
                ),
            );
            continue;
        }

        let sink = sink(ctx, output, source, &converter)?;
        for method in &sink.methods {
            let name = names.claim_reported(&method.name, &mut ctx.diagnostics);
            let signature = SignatureMethod {
                has_this: true,
                return_type: SignatureParameter::value(TypeSignature::Void),
                params: vec![SignatureParameter::value(TypeSignature::Class(method.delegate))],
            };

            let builder = ctx.builder(output);
            for prefix in ["add_", "remove_"] {
                let forward = builder.add_method(
                    provider,
                    ACCESSOR | MethodAttributes::FINAL,
                    RUNTIME_IMPL,
                    &format!("{prefix}{name}"),
                    &signature,
                )?;
                builder.add_param(forward, ParamAttributes::IN, 1, "handler")?;
            }

            let event = builder.add_event(class, 0, &name, method.delegate)?;
            for (prefix, semantics) in [
                ("add_", MethodSemanticsAttributes::ADD_ON),
                ("remove_", MethodSemanticsAttributes::REMOVE_ON),
            ] {
                let accessor = builder.add_method(
                    class,
                    ACCESSOR,
                    RUNTIME_IMPL,
                    &format!("{prefix}{name}"),
                    &signature,
                )?;
                builder.add_param(accessor, ParamAttributes::IN, 1, "handler")?;
                builder.add_method_semantics(semantics, accessor, event)?;
            }
        }

        if !described {
            let interface = ctx.type_argument(output, source)?;
            attributes::attach(
                ctx,
                output,
                class,
                InteropAttribute::ComEventInterface,
                vec![
                    CustomAttributeArgument::Type(interface),
                    CustomAttributeArgument::Type(format!(
                        "{}+{provider_name}",
                        coclass.full_name()
                    )),
                ],
            )?;
            described = true;
        }
    }
    Ok(())
}

/// The nested `C_EventProvider` of `class`.
fn provider(
    ctx: &mut ImportContext,
    output: usize,
    coclass: &TypeConverter,
    class: Token,
) -> Result<(Token, String)> {
    let name = format!("{}_EventProvider", coclass.name);
    let object = ctx.framework_type(output, "System", "Object");
    let builder = ctx.builder(output);

    let provider = builder.add_type_def(
        TypeAttributes::NESTED_ASSEMBLY | TypeAttributes::SEALED,
        "",
        &name,
        Some(object),
    )?;
    builder.add_nested_class(provider, class)?;

    for field in ["m_ConnectionPointContainer", "m_aEventSinkHelpers", "m_ConnectionPoint"] {
        builder.add_field(
            provider,
            FieldAttributes::PRIVATE,
            field,
            &SignatureField {
                base: TypeSignature::Object,
            },
        )?;
    }

    let constructor = builder.add_method(
        provider,
        CONSTRUCTOR,
        RUNTIME_IMPL,
        ".ctor",
        &SignatureMethod {
            has_this: true,
            return_type: SignatureParameter::value(TypeSignature::Void),
            params: vec![SignatureParameter::value(TypeSignature::Object)],
        },
    )?;
    builder.add_param(constructor, ParamAttributes::IN, 1, "container")?;
    builder.add_method(
        provider,
        MethodAttributes::PRIVATE | MethodAttributes::HIDE_BY_SIG,
        RUNTIME_IMPL,
        "Init",
        &SignatureMethod {
            has_this: true,
            return_type: SignatureParameter::value(TypeSignature::Void),
            params: Vec::new(),
        },
    )?;
    Ok((provider, name))
}

/// Delegates and sink helper for source interface `source`, generated on first use.
fn sink(
    ctx: &mut ImportContext,
    output: usize,
    source: ConverterId,
    converter: &TypeConverter,
) -> Result<EventSink> {
    if let Some(existing) = ctx.outputs[output].event_sinks.get(&source) {
        return Ok(existing.clone());
    }

    let (lib, located) = ctx.source(source)?;
    let info = lib.type_info(located.index)?;
    let interface = ctx.type_token(output, source)?;
    let namespace = ctx.outputs[output].namespace.clone();
    let delegate_base = ctx.framework_type(output, "System", "MulticastDelegate");
    let object = ctx.framework_type(output, "System", "Object");

    let mut funcs: Vec<FuncDesc<'_>> = info
        .functions()
        .filter(|func| func.invoke_kind() == InvokeKind::Func)
        .collect();
    if info.kind() != TypeKind::Dispatch {
        funcs.sort_by_key(FuncDesc::vtable_offset);
    }
    let retval_transform = ctx.options.transforms.contains(Transforms::DISPATCH_RETVAL);

    let mut methods = Vec::with_capacity(funcs.len());
    let mut shapes: Vec<(String, FunctionShape)> = Vec::with_capacity(funcs.len());
    let mut method_names = NameScope::new();
    for func in funcs {
        let transform = func.kind() != FuncKind::Dispatch || retval_transform;
        let shape = shape_function(ctx, output, func, true, transform)?;
        let name = method_names.claim_reported(
            &or_fallback(func.name(), || format!("Method{}", func.index())),
            &mut ctx.diagnostics,
        );

        let (delegate_ns, delegate_name) = ctx.claim_type_name(
            output,
            namespace.clone(),
            &format!("{}_{name}EventHandler", converter.name),
        );
        let builder = ctx.builder(output);
        let delegate = builder.add_type_def(
            TypeAttributes::PUBLIC | TypeAttributes::SEALED,
            &delegate_ns,
            &delegate_name,
            Some(delegate_base),
        )?;
        builder.add_method(
            delegate,
            CONSTRUCTOR,
            MethodImplAttributes::RUNTIME,
            ".ctor",
            &SignatureMethod {
                has_this: true,
                return_type: SignatureParameter::value(TypeSignature::Void),
                params: vec![
                    SignatureParameter::value(TypeSignature::Object),
                    SignatureParameter::value(TypeSignature::I),
                ],
            },
        )?;
        emit_method(
            ctx,
            output,
            delegate,
            "Invoke",
            MethodAttributes::PUBLIC
                | MethodAttributes::VIRTUAL
                | MethodAttributes::HIDE_BY_SIG
                | MethodAttributes::NEW_SLOT,
            MethodImplAttributes::RUNTIME,
            &FunctionShape {
                preserve_sig: false,
                lcid: None,
                ..shape.clone()
            },
        )?;

        methods.push(EventMethod {
            name: name.clone(),
            delegate,
        });
        shapes.push((name, shape));
    }

    let (helper_ns, helper_name) =
        ctx.claim_type_name(output, namespace, &format!("{}_SinkHelper", converter.name));
    let builder = ctx.builder(output);
    let helper = builder.add_type_def(
        TypeAttributes::NOT_PUBLIC | TypeAttributes::SEALED,
        &helper_ns,
        &helper_name,
        Some(object),
    )?;
    builder.add_interface_impl(helper, interface)?;
    for method in &methods {
        builder.add_field(
            helper,
            FieldAttributes::PUBLIC,
            &format!("m_{}Delegate", method.name),
            &SignatureField {
                base: TypeSignature::Class(method.delegate),
            },
        )?;
    }
    builder.add_field(
        helper,
        FieldAttributes::PUBLIC,
        "m_dwCookie",
        &SignatureField {
            base: TypeSignature::I4,
        },
    )?;
    builder.add_method(
        helper,
        CONSTRUCTOR,
        RUNTIME_IMPL,
        ".ctor",
        &SignatureMethod {
            has_this: true,
            return_type: SignatureParameter::value(TypeSignature::Void),
            params: Vec::new(),
        },
    )?;
    for (name, shape) in &shapes {
        emit_method(
            ctx,
            output,
            helper,
            name,
            MethodAttributes::PUBLIC
                | MethodAttributes::VIRTUAL
                | MethodAttributes::FINAL
                | MethodAttributes::HIDE_BY_SIG
                | MethodAttributes::NEW_SLOT,
            RUNTIME_IMPL,
            shape,
        )?;
    }

    let sink = EventSink { helper, methods };
    ctx.outputs[output].event_sinks.insert(source, sink.clone());
    log::debug!(
        "generated event sink for '{}' with {} methods",
        converter.full_name(),
        sink.methods.len()
    );
    Ok(sink)
}
