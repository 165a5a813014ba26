//! Structural properties every emitted assembly must satisfy, and the round-trip laws between a
//! source library and its import.

mod common;

use std::collections::HashSet;

use tlbscope::{
    importer::{context::ImportContext, symbols::SymbolKey},
    metadata::{
        flags::{FieldAttributes, MethodSemanticsAttributes, TypeAttributes},
        signatures::{parse_field_signature, parse_method_signature, TypeSignature},
        tables::TableId,
        token::Token,
    },
    prelude::*,
};

use common::*;

fn libraries() -> Vec<TypeLib> {
    vec![
        empty_enum_library(),
        foo_library(),
        events_library(),
        collision_library(),
        alias_chain_library(),
        automation_library(),
        layout_library(),
    ]
}

fn images() -> Result<Vec<AssemblyImage>> {
    libraries()
        .into_iter()
        .map(|lib| import(lib).map(|(_, image)| image))
        .collect()
}

/// `true` if the row ranges, in order, tile `1..=total` without gaps or overlaps.
fn tiles(ranges: &[std::ops::Range<u32>], total: u32) -> bool {
    let mut next = 1;
    for range in ranges {
        if range.start != next || range.end < range.start {
            return false;
        }
        next = range.end;
    }
    next == total + 1
}

#[test]
fn test_references_are_deduplicated() -> Result<()> {
    for image in images()? {
        let assembly_refs: Vec<String> = image
            .assembly_refs()?
            .iter()
            .map(AssemblyIdentity::display_name)
            .collect();
        let unique: HashSet<&String> = assembly_refs.iter().collect();
        assert_eq!(unique.len(), assembly_refs.len(), "{assembly_refs:?}");

        let type_refs = image.type_refs()?;
        let unique: HashSet<_> = type_refs
            .iter()
            .map(|ty| (ty.scope, ty.namespace.as_str(), ty.name.as_str()))
            .collect();
        assert_eq!(unique.len(), type_refs.len());

        let member_refs = image.member_refs()?;
        let unique: HashSet<_> = member_refs
            .iter()
            .map(|member| (member.parent, member.name.as_str(), member.signature.as_slice()))
            .collect();
        assert_eq!(unique.len(), member_refs.len());
    }
    Ok(())
}

#[test]
fn test_member_lists_are_contiguous() -> Result<()> {
    for image in images()? {
        let types = image.type_defs()?;
        let fields: Vec<_> = types.iter().map(|ty| ty.fields.clone()).collect();
        let methods: Vec<_> = types.iter().map(|ty| ty.methods.clone()).collect();
        assert!(tiles(&fields, image.row_count(TableId::Field)));
        assert!(tiles(&methods, image.row_count(TableId::MethodDef)));

        let params: Vec<_> = image
            .methods()?
            .into_iter()
            .map(|method| method.params)
            .collect();
        assert!(tiles(&params, image.row_count(TableId::Param)));

        for ty in &types {
            let owned = image.fields_of(ty.token)?;
            assert_eq!(owned.len(), ty.fields.len());
        }
    }
    Ok(())
}

#[test]
fn test_symbol_lookups_are_stable() -> Result<()> {
    let mut ctx = ImportContext::new(ImportOptions::new())?;
    let library = ctx.resolver.add_library(automation_library());
    ctx.import_library(library)?;

    let lib = ctx.library(library)?;
    for info in lib.types() {
        let first = ctx.register(library, info.index())?;
        let second = ctx.register(library, info.index())?;
        assert_eq!(first, second);
        assert_eq!(
            ctx.symbols
                .lookup(&SymbolKey::by_index(&lib.identity(), info.index())),
            Some(first)
        );
        if info.guid() != uguid::Guid::ZERO {
            assert_eq!(
                ctx.symbols
                    .lookup(&SymbolKey::by_guid(&lib.identity(), info.guid())),
                Some(first)
            );
        }
    }
    assert_eq!(ctx.symbols.len(), lib.type_count());
    Ok(())
}

#[test]
fn test_alias_chains_terminate() -> Result<()> {
    let (result, image) = import(alias_chain_library())?;
    assert_eq!(result.diagnostics.with_code(codes::ALIAS_CYCLE).count(), 0);
    assert!(image.find_type("Chain", "E")?.is_some());

    let mut builder = TypeLibBuilder::new("Loop", uguid::guid!("10000000-0000-4000-8000-000000000001"));
    builder.add_type(
        TypeInfoBuilder::new("SELF", TypeKind::Alias)
            .alias(TypeDesc::UserDefined(HRefType::local(0))),
    );
    builder.add_type(
        TypeInfoBuilder::new("USER", TypeKind::Record)
            .variable(VarBuilder::new("value", TypeDesc::UserDefined(HRefType::local(0)))),
    );
    let (result, image) = import(builder.build())?;
    assert!(result.diagnostics.with_code(codes::ALIAS_CYCLE).count() >= 1);
    // the record is still emitted
    assert!(image.find_type("Loop", "USER")?.is_some());
    Ok(())
}

fn referenced_tokens(signature: &TypeSignature, out: &mut Vec<Token>) {
    match signature {
        TypeSignature::ValueType(token) | TypeSignature::Class(token) => out.push(*token),
        TypeSignature::Ptr(inner) | TypeSignature::SzArray(inner) => referenced_tokens(inner, out),
        _ => {}
    }
}

#[test]
fn test_signatures_are_closed() -> Result<()> {
    for image in images()? {
        let mut tokens = Vec::new();
        for field in image.fields()? {
            referenced_tokens(&parse_field_signature(&field.signature)?.base, &mut tokens);
        }
        for method in image.methods()? {
            let signature = parse_method_signature(&method.signature)?;
            referenced_tokens(&signature.return_type.base, &mut tokens);
            for param in &signature.params {
                referenced_tokens(&param.base, &mut tokens);
            }
        }

        let type_defs = image.row_count(TableId::TypeDef);
        let type_refs = image.type_refs()?;
        let assembly_refs = image.row_count(TableId::AssemblyRef);
        for token in tokens {
            match token.table_id() {
                Some(TableId::TypeDef) => assert!(token.row() >= 1 && token.row() <= type_defs),
                Some(TableId::TypeRef) => {
                    let row = type_refs
                        .get(token.row() as usize - 1)
                        .expect("TypeRef row");
                    assert_eq!(row.scope.tag, TableId::AssemblyRef);
                    assert!(row.scope.row >= 1 && row.scope.row <= assembly_refs);
                }
                other => panic!("unexpected token table {other:?}"),
            }
        }
    }
    Ok(())
}

#[test]
fn test_save_once() -> Result<()> {
    let dir = scratch("save-once");
    let path = dir.join("Foo.dll");
    let mut result = Importer::new(ImportOptions::new().with_output(&path)).import(foo_library())?;

    result.save_all()?;
    let written = std::fs::read(&path)?;

    let assembly = &mut result.assemblies[0];
    assert!(matches!(assembly.save(), Err(Error::AlreadySaved(_))));
    assert!(matches!(
        assembly.save_to(dir.join("Other.dll")),
        Err(Error::AlreadySaved(_))
    ));
    assert_eq!(std::fs::read(&path)?, written);
    assert!(!dir.join("Other.dll").exists());

    std::fs::remove_dir_all(dir)?;
    Ok(())
}

#[test]
fn test_enum_round_trip() -> Result<()> {
    let lib = layout_library();
    let source = lib.find_by_name("Flags").expect("Flags");
    let expected: Vec<(String, i64)> = source
        .variables()
        .map(|var| {
            let value = var.const_value().and_then(Variant::as_i64).expect("value");
            (var.name().to_string(), value)
        })
        .collect();

    let (_, image) = import(lib.clone())?;
    let flags = image.find_type("Layout", "Flags")?.expect("Flags");
    let constants = image.constants()?;

    let literals: Vec<(String, i64)> = image
        .fields_of(flags.token)?
        .into_iter()
        .filter(|field| {
            field.flags & (FieldAttributes::STATIC | FieldAttributes::LITERAL)
                == FieldAttributes::STATIC | FieldAttributes::LITERAL
        })
        .map(|field| {
            let constant = constants
                .iter()
                .find(|constant| constant.parent.token == field.token)
                .expect("constant row");
            let bytes: [u8; 4] = constant.value.as_slice().try_into().expect("int32");
            (field.name, i64::from(i32::from_le_bytes(bytes)))
        })
        .collect();
    assert_eq!(literals, expected);
    Ok(())
}

/// Size of a primitive field signature.
fn primitive_size(signature: &TypeSignature) -> u32 {
    match signature {
        TypeSignature::I1 | TypeSignature::U1 | TypeSignature::Boolean => 1,
        TypeSignature::I2 | TypeSignature::U2 | TypeSignature::Char => 2,
        TypeSignature::I4 | TypeSignature::U4 | TypeSignature::R4 => 4,
        TypeSignature::I8 | TypeSignature::U8 | TypeSignature::R8 => 8,
        other => panic!("not a primitive: {other:?}"),
    }
}

#[test]
fn test_record_round_trip() -> Result<()> {
    let lib = layout_library();
    let (_, image) = import(lib.clone())?;
    let layouts = image.class_layouts();

    for name in ["MIXED", "PAIR"] {
        let source = lib.find_by_name(name).expect("record");
        let attr = source.attributes();
        let source_offsets: Vec<u32> = source.variables().filter_map(|var| var.offset()).collect();

        let record = image.find_type("Layout", name)?.expect("record");
        assert_ne!(record.flags & TypeAttributes::SEQUENTIAL_LAYOUT, 0);
        let layout = layouts
            .iter()
            .find(|row| row.parent == record.token.row())
            .expect("ClassLayout");
        assert_eq!(layout.class_size, attr.size_instance);

        // sequential layout: each field at the next multiple of min(size, packing)
        let packing = u32::from(layout.packing_size);
        let mut cursor: u32 = 0;
        let mut offsets = Vec::new();
        for field in image.fields_of(record.token)? {
            let size = primitive_size(&parse_field_signature(&field.signature)?.base);
            let align = size.min(packing);
            cursor = cursor.div_ceil(align) * align;
            offsets.push(cursor);
            cursor += size;
        }
        assert_eq!(offsets, source_offsets, "{name}");
    }
    Ok(())
}

#[test]
fn test_property_round_trip() -> Result<()> {
    let (result, image) = import(automation_library())?;
    let account = image.find_type("Bank", "IAccount")?.expect("IAccount");
    let properties = image.properties_of(account.token)?;

    let count = |name: &str| properties.iter().filter(|p| p.name == name).count();
    assert_eq!(count("Balance"), 1);
    assert_eq!(count("Owner"), 2);
    assert_eq!(count("Name"), 1);

    let methods = image.methods_of(account.token)?;
    let method_names: Vec<&str> = methods.iter().map(|m| m.name.as_str()).collect();
    for accessor in ["get_Balance", "set_Balance", "get_Owner", "let_Owner", "set_Owner", "get_Name"] {
        assert!(method_names.contains(&accessor), "missing {accessor}");
    }

    let semantics = image.method_semantics()?;
    let name = properties.iter().find(|p| p.name == "Name").expect("Name");
    let name_semantics: Vec<u16> = semantics
        .iter()
        .filter(|row| row.association.token == name.token)
        .map(|row| row.semantics)
        .collect();
    assert_eq!(name_semantics, [MethodSemanticsAttributes::GETTER]);

    let default_member = image
        .find_attribute(account.token, "System.Reflection", "DefaultMemberAttribute")?
        .expect("DefaultMember");
    assert_eq!(default_member.string_argument().as_deref(), Some("Name"));

    let status = image.find_type("Bank", "DStatus")?.expect("DStatus");
    let status_properties: Vec<String> = image
        .properties_of(status.token)?
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(status_properties, ["Open", "Limit"]);
    let status_methods: Vec<String> = image
        .methods_of(status.token)?
        .into_iter()
        .map(|m| m.name)
        .collect();
    assert!(status_methods.contains(&"set_Open".to_string()));
    assert!(!status_methods.contains(&"set_Limit".to_string()));

    assert!(!result.diagnostics.has_errors());
    Ok(())
}
