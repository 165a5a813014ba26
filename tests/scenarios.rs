//! End-to-end import scenarios.
//!
//! Each test builds a library in memory, imports it, serializes the primary assembly and reads
//! the image back to check the emitted metadata.

mod common;

use tlbscope::{
    metadata::{
        flags::{MethodImplAttributes, TypeAttributes},
        marshalling::NATIVE_TYPE,
        signatures::{parse_field_signature, parse_method_signature, TypeSignature},
        tables::TableId,
    },
    prelude::*,
};

use common::*;

fn user_types(image: &AssemblyImage) -> Result<Vec<String>> {
    Ok(image
        .type_defs()?
        .into_iter()
        .filter(|ty| ty.name != "<Module>")
        .map(|ty| ty.name)
        .collect())
}

#[test]
fn test_empty_enum() -> Result<()> {
    let (_, image) = import(empty_enum_library())?;

    assert_eq!(user_types(&image)?, ["Nothing"]);
    let nothing = image.find_type("Empty", "Nothing")?.expect("enum");
    assert_eq!(
        image.type_name(nothing.extends)?,
        ("System".to_string(), "Enum".to_string())
    );

    let fields = image.fields_of(nothing.token)?;
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].name, "value__");
    assert!(nothing.methods.is_empty());
    assert_eq!(nothing.fields.end, image.row_count(TableId::Field) + 1);
    Ok(())
}

#[test]
fn test_single_method_interface() -> Result<()> {
    let (_, image) = import(foo_library())?;

    let foo = image.find_type("Foo", "IFoo")?.expect("IFoo");
    assert_ne!(foo.flags & TypeAttributes::INTERFACE, 0);

    let methods = image.methods_of(foo.token)?;
    assert_eq!(methods.len(), 1);
    let bar = &methods[0];
    assert_eq!(bar.name, "Bar");
    assert_eq!(bar.impl_flags & MethodImplAttributes::PRESERVE_SIG.bits(), 0);

    let signature = parse_method_signature(&bar.signature)?;
    assert_eq!(signature.return_type.base, TypeSignature::String);
    assert_eq!(signature.params.len(), 1);
    assert_eq!(signature.params[0].base, TypeSignature::I4);

    let params = image.params_of(bar.token)?;
    let ret = params.iter().find(|param| param.sequence == 0).expect("return param");
    let x = params.iter().find(|param| param.sequence == 1).expect("x");
    assert_eq!(x.name, "x");

    let marshals = image.field_marshals()?;
    let (_, blob) = marshals
        .iter()
        .find(|(parent, _)| parent.token == ret.token)
        .expect("return marshalling");
    assert_eq!(blob.as_slice(), [NATIVE_TYPE::BSTR]);
    Ok(())
}

#[test]
fn test_cross_library_reference() -> Result<()> {
    let dir = scratch("cross-library");
    let a_path = dir.join("A.dll");
    let b_path = dir.join("B.dll");

    let mut a = Importer::new(ImportOptions::new().with_output(&a_path)).import(library_a())?;
    a.save_all()?;

    let mut b = Importer::new(
        ImportOptions::new()
            .with_output(&b_path)
            .with_reference(&a_path),
    )
    .import(library_b())?;
    assert_eq!(b.assemblies.len(), 1, "A must not be imported again");
    assert!(b.diagnostics.with_code(codes::DEPENDENCY_IMPORTED).next().is_none());
    let written = b.save_all()?;
    assert_eq!(written, [b_path.clone()]);

    let image = AssemblyImage::from_file(&b_path)?;
    assert_eq!(user_types(&image)?, ["IB"]);

    let ia = image
        .type_refs()?
        .into_iter()
        .find(|ty| ty.name == "IA")
        .expect("TypeRef IA");
    assert_eq!(ia.scope.tag, TableId::AssemblyRef);
    let refs = image.assembly_refs()?;
    let scope = &refs[ia.scope.row as usize - 1];
    assert_eq!(scope.name, "A");

    let ib = image.find_type("B", "IB")?.expect("IB");
    let implemented: Vec<_> = image
        .interface_impls()?
        .into_iter()
        .filter(|(class, _)| *class == ib.token)
        .map(|(_, interface)| interface.token)
        .collect();
    assert_eq!(implemented, [ia.token]);

    // inherited members stay on IA
    let methods: Vec<String> = image
        .methods_of(ib.token)?
        .into_iter()
        .map(|method| method.name)
        .collect();
    assert_eq!(methods, ["Second"]);

    std::fs::remove_dir_all(dir)?;
    Ok(())
}

#[test]
fn test_coclass_with_source_interface() -> Result<()> {
    let (_, image) = import(events_library())?;

    let types = user_types(&image)?;
    for expected in ["C", "IC", "IEvents", "IEvents_SinkHelper", "C_EventProvider"] {
        assert!(types.iter().any(|name| name == expected), "missing {expected}");
    }

    let class = image.find_type("Widgets", "C")?.expect("C");
    let events = image.events_of(class.token)?;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "Clicked");

    let source = image
        .find_attribute(
            class.token,
            "System.Runtime.InteropServices",
            "ComSourceInterfacesAttribute",
        )?
        .expect("ComSourceInterfaces");
    assert_eq!(source.string_argument().as_deref(), Some("Widgets.IEvents\0"));
    Ok(())
}

#[test]
fn test_member_name_collision() -> Result<()> {
    let (result, image) = import(collision_library())?;

    let clash = image.find_type("Clash", "IClash")?.expect("IClash");
    let names: Vec<String> = image
        .methods_of(clash.token)?
        .into_iter()
        .map(|method| method.name)
        .collect();
    assert_eq!(names, ["Do", "Do_2"]);

    let warnings: Vec<String> = result
        .diagnostics
        .with_code(codes::NAME_COLLISION)
        .map(ToString::to_string)
        .collect();
    assert_eq!(
        warnings,
        ["warning TI2001: member name 'Do' duplicated, renamed to 'Do_2'"]
    );
    Ok(())
}

#[test]
fn test_alias_chain() -> Result<()> {
    let (_, image) = import(alias_chain_library())?;

    let types = user_types(&image)?;
    assert!(!types.iter().any(|name| name == "T1" || name == "T2"));
    let e = image.find_type("Chain", "E")?.expect("E");

    let holder = image.find_type("Chain", "HOLDER")?.expect("HOLDER");
    let field = &image.fields_of(holder.token)?[0];
    assert_eq!(
        parse_field_signature(&field.signature)?.base,
        TypeSignature::ValueType(e.token)
    );

    let user = image.find_type("Chain", "IUser")?.expect("IUser");
    let method = &image.methods_of(user.token)?[0];
    let signature = parse_method_signature(&method.signature)?;
    assert_eq!(signature.params[0].base, TypeSignature::ValueType(e.token));
    Ok(())
}

#[test]
fn test_missing_dependency_is_fatal() {
    match Importer::new(ImportOptions::new().with_search_path(std::env::temp_dir()))
        .import(library_b())
    {
        Err(error @ Error::MissingDependency { .. }) => assert_eq!(error.exit_code(), 2),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_provided_dependency_gets_its_own_assembly() -> Result<()> {
    let dir = scratch("sibling");
    let result = Importer::new(
        ImportOptions::new()
            .with_output(dir.join("B.dll"))
            .with_verbose(true),
    )
    .with_library(library_a())
    .import(library_b())?;

    assert_eq!(result.assemblies.len(), 2);
    assert!(result.assemblies[0].primary);
    let sibling = result.find("a").expect("sibling assembly");
    assert_eq!(sibling.path, dir.join("A.dll"));
    assert_eq!(
        result.diagnostics.with_code(codes::DEPENDENCY_IMPORTED).count(),
        1
    );

    let image = AssemblyImage::from_bytes(result.assemblies[0].to_bytes()?)?;
    let ia = image
        .type_refs()?
        .into_iter()
        .find(|ty| ty.name == "IA")
        .expect("TypeRef IA");
    let refs = image.assembly_refs()?;
    assert_eq!(refs[ia.scope.row as usize - 1].name, "A");

    std::fs::remove_dir_all(dir)?;
    Ok(())
}

#[test]
fn test_module_pinvoke() -> Result<()> {
    let (_, image) = import(layout_library())?;
    let native = image.find_type("Layout", "Native")?.expect("Native");
    let methods = image.methods_of(native.token)?;
    assert_eq!(methods.len(), 1);

    let maps = image.impl_maps()?;
    assert_eq!(maps.len(), 1);
    assert_eq!(maps[0].import_name, "OpenA");
    assert_eq!(maps[0].module, "native.dll");
    assert_eq!(maps[0].member.token, methods[0].token);
    Ok(())
}

#[test]
fn test_two_versions_of_one_library() -> Result<()> {
    let result = Importer::new(
        ImportOptions::new().with_output(std::env::temp_dir().join("Widgets.dll")),
    )
    .with_library(widgets_v1())
    .import(widgets_v2())?;
    assert_eq!(result.assemblies.len(), 2);

    let legacy = AssemblyImage::from_bytes(result.assemblies[1].to_bytes()?)?;
    assert_eq!(user_types(&legacy)?, ["IWidget"]);

    let primary = AssemblyImage::from_bytes(result.assemblies[0].to_bytes()?)?;
    assert_eq!(user_types(&primary)?, ["IWidget2"]);
    let old = primary
        .type_refs()?
        .into_iter()
        .find(|ty| ty.name == "IWidget")
        .expect("TypeRef IWidget");
    let refs = primary.assembly_refs()?;
    assert_eq!(refs[old.scope.row as usize - 1].name, "WidgetsLegacy");
    Ok(())
}

#[test]
fn test_reference_assembly_serves_index_reference() -> Result<()> {
    let dir = scratch("by-index");
    let geometry = dir.join("Geometry.dll");
    let mut first = Importer::new(ImportOptions::new().with_output(&geometry))
        .import(geometry_library())?;
    first.save_all()?;

    let result = Importer::new(
        ImportOptions::new()
            .with_output(dir.join("Canvas.dll"))
            .with_reference(&geometry),
    )
    .with_library(geometry_library())
    .import(canvas_library())?;
    assert_eq!(result.assemblies.len(), 1, "Geometry must not be imported again");
    assert!(result
        .diagnostics
        .with_code(codes::DEPENDENCY_IMPORTED)
        .next()
        .is_none());

    let image = AssemblyImage::from_bytes(result.assemblies[0].to_bytes()?)?;
    let point = image
        .type_refs()?
        .into_iter()
        .find(|ty| ty.name == "POINT")
        .expect("TypeRef POINT");
    let refs = image.assembly_refs()?;
    assert_eq!(refs[point.scope.row as usize - 1].name, "Geometry");

    let shape = image.find_type("Canvas", "SHAPE")?.expect("SHAPE");
    let origin = &image.fields_of(shape.token)?[0];
    assert_eq!(
        parse_field_signature(&origin.signature)?.base,
        TypeSignature::ValueType(point.token)
    );

    std::fs::remove_dir_all(dir)?;
    Ok(())
}

#[test]
fn test_index_reference_without_library_names_the_cause() -> Result<()> {
    let dir = scratch("by-index-missing");
    let geometry = dir.join("Geometry.dll");
    let mut first = Importer::new(ImportOptions::new().with_output(&geometry))
        .import(geometry_library())?;
    first.save_all()?;

    let outcome = Importer::new(
        ImportOptions::new()
            .with_output(dir.join("Canvas.dll"))
            .with_reference(&geometry)
            .with_search_path(&dir),
    )
    .import(canvas_library());
    match outcome {
        Err(Error::MissingDependency { library, .. }) => {
            assert!(library.contains("by-index reference"));
        }
        other => panic!("unexpected {other:?}"),
    }

    std::fs::remove_dir_all(dir)?;
    Ok(())
}

#[test]
fn test_failed_save_keeps_planned_path() -> Result<()> {
    let dir = scratch("failed-save");
    let planned = dir.join("Foo.dll");
    let mut result = Importer::new(ImportOptions::new().with_output(&planned)).import(foo_library())?;

    let assembly = &mut result.assemblies[0];
    assert!(assembly.save_to(dir.join("missing").join("Foo.dll")).is_err());
    assert_eq!(assembly.path, planned);

    assert_eq!(result.save_all()?, [planned.clone()]);
    assert!(planned.is_file());

    std::fs::remove_dir_all(dir)?;
    Ok(())
}
