//! Libraries and helpers shared by the integration tests.
#![allow(dead_code)]

use std::path::PathBuf;

use tlbscope::{
    prelude::*,
    typelib::{EntryPoint, LibraryIdentity},
};
use uguid::{guid, Guid};

pub const IID_IUNKNOWN: Guid = guid!("00000000-0000-0000-c000-000000000046");
pub const IID_IDISPATCH: Guid = guid!("00020400-0000-0000-c000-000000000046");
pub const STDOLE: Guid = guid!("00020430-0000-0000-c000-000000000046");

pub const LIBID_A: Guid = guid!("a0000000-0000-4000-8000-00000000000a");
pub const LIBID_B: Guid = guid!("b0000000-0000-4000-8000-00000000000b");
pub const IID_IA: Guid = guid!("a0000000-0000-4000-8000-0000000000a1");
pub const IID_IB: Guid = guid!("b0000000-0000-4000-8000-0000000000b1");

pub const LIBID_WIDGETS: Guid = guid!("57000000-0000-4000-8000-000000000057");
pub const LIBID_GEOMETRY: Guid = guid!("6e000000-0000-4000-8000-00000000006e");
pub const LIBID_CANVAS: Guid = guid!("ca000000-0000-4000-8000-0000000000ca");

/// A scratch directory unique to one test.
pub fn scratch(test: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tlbscope-{}-{test}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("scratch directory");
    dir
}

/// Import `lib` and read the primary assembly back.
pub fn import(lib: TypeLib) -> Result<(ImportResult, AssemblyImage)> {
    import_with(lib, ImportOptions::new())
}

/// Import `lib` with `options` and read the primary assembly back.
pub fn import_with(lib: TypeLib, options: ImportOptions) -> Result<(ImportResult, AssemblyImage)> {
    let result = Importer::new(options).import(lib)?;
    let primary = result.primary().expect("primary assembly");
    let image = AssemblyImage::from_bytes(primary.to_bytes()?)?;
    Ok((result, image))
}

/// Declare `stdole` 2.0 as an import of `builder`.
pub fn import_stdole(builder: &mut TypeLibBuilder) -> usize {
    builder.import_library(
        LibraryIdentity {
            guid: STDOLE,
            major: 2,
            minor: 0,
            lcid: 0,
        },
        "stdole2.tlb",
    )
}

/// One enum without members.
pub fn empty_enum_library() -> TypeLib {
    let mut builder = TypeLibBuilder::new("Empty", guid!("e0000000-0000-4000-8000-0000000000e0"));
    builder.add_type(
        TypeInfoBuilder::new("Nothing", TypeKind::Enum)
            .guid(guid!("00000000-0000-0000-0000-000000000001")),
    );
    builder.build()
}

/// `IFoo { HRESULT Bar([in] long x, [out, retval] BSTR* r); }`
pub fn foo_library() -> TypeLib {
    let mut builder = TypeLibBuilder::new("Foo", guid!("f0000000-0000-4000-8000-0000000000f0"));
    let stdole = import_stdole(&mut builder);
    let unknown = builder.import_type_by_guid(stdole, IID_IUNKNOWN);
    builder.add_type(
        TypeInfoBuilder::new("IFoo", TypeKind::Interface)
            .guid(guid!("f0000000-0000-4000-8000-0000000000f1"))
            .inherits(unknown)
            .function(
                FuncBuilder::new("Bar", 1)
                    .param("x", TypeDesc::Base(VarType::I4), ParamFlags::IN)
                    .retval("r", TypeDesc::Base(VarType::Bstr)),
            ),
    );
    builder.build()
}

/// Library `A` 1.0 with interface `IA`.
pub fn library_a() -> TypeLib {
    let mut builder = TypeLibBuilder::new("A", LIBID_A).version(1, 0);
    let stdole = import_stdole(&mut builder);
    let unknown = builder.import_type_by_guid(stdole, IID_IUNKNOWN);
    builder.add_type(
        TypeInfoBuilder::new("IA", TypeKind::Interface)
            .guid(IID_IA)
            .inherits(unknown)
            .function(FuncBuilder::new("First", 1)),
    );
    builder.build()
}

/// Library `B` with `IB : IA`, `IA` imported from [`library_a`].
pub fn library_b() -> TypeLib {
    let mut builder = TypeLibBuilder::new("B", LIBID_B).version(1, 0);
    let a = builder.import_library(
        LibraryIdentity {
            guid: LIBID_A,
            major: 1,
            minor: 0,
            lcid: 0,
        },
        "A.tlb",
    );
    let ia = builder.import_type_by_guid(a, IID_IA);
    builder.add_type(
        TypeInfoBuilder::new("IB", TypeKind::Interface)
            .guid(IID_IB)
            .inherits(ia)
            .function(
                FuncBuilder::new("Second", 2)
                    .param("other", TypeDesc::ptr(TypeDesc::UserDefined(ia)), ParamFlags::IN),
            ),
    );
    builder.build()
}

/// Coclass `C` with default `IC` and source `IEvents { void Clicked(); }`.
pub fn events_library() -> TypeLib {
    let mut builder = TypeLibBuilder::new("Widgets", guid!("c0000000-0000-4000-8000-0000000000c0"));
    let stdole = import_stdole(&mut builder);
    let unknown = builder.import_type_by_guid(stdole, IID_IUNKNOWN);
    let ic = builder.add_type(
        TypeInfoBuilder::new("IC", TypeKind::Interface)
            .guid(guid!("c0000000-0000-4000-8000-0000000000c1"))
            .inherits(unknown)
            .function(FuncBuilder::new("Click", 1)),
    );
    let events = builder.add_type(
        TypeInfoBuilder::new("IEvents", TypeKind::Dispatch)
            .guid(guid!("c0000000-0000-4000-8000-0000000000c2"))
            .function(FuncBuilder::new("Clicked", 1).returns(TypeDesc::Base(VarType::Void))),
    );
    builder.add_type(
        TypeInfoBuilder::new("C", TypeKind::CoClass)
            .guid(guid!("c0000000-0000-4000-8000-0000000000c3"))
            .implements(ic, ImplTypeFlags::DEFAULT)
            .implements(events, ImplTypeFlags::DEFAULT | ImplTypeFlags::SOURCE),
    );
    builder.build()
}

/// An interface with two methods named `Do`.
pub fn collision_library() -> TypeLib {
    let mut builder = TypeLibBuilder::new("Clash", guid!("d0000000-0000-4000-8000-0000000000d0"));
    builder.add_type(
        TypeInfoBuilder::new("IClash", TypeKind::Interface)
            .guid(guid!("d0000000-0000-4000-8000-0000000000d1"))
            .function(FuncBuilder::new("Do", 1))
            .function(FuncBuilder::new("Do", 2).param(
                "count",
                TypeDesc::Base(VarType::I4),
                ParamFlags::IN,
            )),
    );
    builder.build()
}

/// `T1 = T2 = enum E`, used by a record field and a method parameter.
pub fn alias_chain_library() -> TypeLib {
    let mut builder = TypeLibBuilder::new("Chain", guid!("ac000000-0000-4000-8000-0000000000ac"));
    let e = builder.add_type(
        TypeInfoBuilder::new("E", TypeKind::Enum)
            .constant("One", Variant::I4(1))
            .constant("Two", Variant::I4(2)),
    );
    let t2 = builder.add_type(TypeInfoBuilder::new("T2", TypeKind::Alias).alias(TypeDesc::UserDefined(e)));
    let t1 = builder.add_type(TypeInfoBuilder::new("T1", TypeKind::Alias).alias(TypeDesc::UserDefined(t2)));
    builder.add_type(
        TypeInfoBuilder::new("HOLDER", TypeKind::Record)
            .variable(VarBuilder::new("value", TypeDesc::UserDefined(t1))),
    );
    builder.add_type(
        TypeInfoBuilder::new("IUser", TypeKind::Interface)
            .guid(guid!("ac000000-0000-4000-8000-0000000000a1"))
            .function(FuncBuilder::new("Use", 1).param(
                "value",
                TypeDesc::UserDefined(t1),
                ParamFlags::IN,
            )),
    );
    builder.build()
}

/// A dual automation interface with properties, a default member and a dispinterface with
/// variables.
pub fn automation_library() -> TypeLib {
    let mut builder = TypeLibBuilder::new("Bank", guid!("ba000000-0000-4000-8000-0000000000ba"))
        .version(2, 1);
    let stdole = import_stdole(&mut builder);
    let dispatch = builder.import_type_by_guid(stdole, IID_IDISPATCH);
    let r8 = || TypeDesc::Base(VarType::R8);
    let object = || TypeDesc::Base(VarType::Dispatch);

    builder.add_type(
        TypeInfoBuilder::new("IAccount", TypeKind::Interface)
            .guid(guid!("ba000000-0000-4000-8000-0000000000b1"))
            .flags(TypeFlags::DUAL | TypeFlags::OLEAUTOMATION)
            .inherits(dispatch)
            .function(
                FuncBuilder::new("Balance", 1)
                    .invoke(InvokeKind::PropertyGet)
                    .retval("value", r8()),
            )
            .function(
                FuncBuilder::new("Balance", 1)
                    .invoke(InvokeKind::PropertyPut)
                    .param("value", r8(), ParamFlags::IN),
            )
            .function(
                FuncBuilder::new("Owner", 2)
                    .invoke(InvokeKind::PropertyGet)
                    .retval("value", object()),
            )
            .function(
                FuncBuilder::new("Owner", 2)
                    .invoke(InvokeKind::PropertyPut)
                    .param("value", object(), ParamFlags::IN),
            )
            .function(
                FuncBuilder::new("Owner", 2)
                    .invoke(InvokeKind::PropertyPutRef)
                    .param("value", object(), ParamFlags::IN),
            )
            .function(
                FuncBuilder::new("Name", 0)
                    .invoke(InvokeKind::PropertyGet)
                    .retval("value", TypeDesc::Base(VarType::Bstr)),
            )
            .function(
                FuncBuilder::new("Deposit", 3)
                    .param("amount", r8(), ParamFlags::IN)
                    .param_with_default(
                        "memo",
                        TypeDesc::Base(VarType::Bstr),
                        ParamFlags::IN,
                        Variant::Bstr(Some(String::new())),
                    ),
            ),
    );
    builder.add_type(
        TypeInfoBuilder::new("DStatus", TypeKind::Dispatch)
            .guid(guid!("ba000000-0000-4000-8000-0000000000b2"))
            .variable(VarBuilder::new("Open", TypeDesc::Base(VarType::Bool)).memid(1))
            .variable(
                VarBuilder::new("Limit", r8())
                    .memid(2)
                    .flags(VarFlags::READONLY),
            ),
    );
    builder.build()
}

/// Records with mixed field widths, a union and a module.
pub fn layout_library() -> TypeLib {
    let mut builder = TypeLibBuilder::new("Layout", guid!("1a000000-0000-4000-8000-00000000001a"));
    builder.add_type(
        TypeInfoBuilder::new("MIXED", TypeKind::Record)
            .variable(VarBuilder::new("a", TypeDesc::Base(VarType::I2)))
            .variable(VarBuilder::new("b", TypeDesc::Base(VarType::I4)))
            .variable(VarBuilder::new("c", TypeDesc::Base(VarType::R8)))
            .variable(VarBuilder::new("d", TypeDesc::Base(VarType::UI1))),
    );
    builder.add_type(
        TypeInfoBuilder::new("PAIR", TypeKind::Record)
            .variable(VarBuilder::new("low", TypeDesc::Base(VarType::UI2)))
            .variable(VarBuilder::new("high", TypeDesc::Base(VarType::UI2))),
    );
    builder.add_type(
        TypeInfoBuilder::new("Flags", TypeKind::Enum)
            .constant("None", Variant::I4(0))
            .constant("Read", Variant::I4(1))
            .constant("Write", Variant::I4(2))
            .constant("All", Variant::I4(3)),
    );
    builder.add_type(
        TypeInfoBuilder::new("Native", TypeKind::Module)
            .dll("native.dll")
            .constant("VERSION", Variant::I4(7))
            .function(
                FuncBuilder::new("Open", 0x6000_0000)
                    .returns(TypeDesc::Base(VarType::I4))
                    .param("path", TypeDesc::Base(VarType::LpStr), ParamFlags::IN)
                    .entry(EntryPoint::Name("OpenA".to_string())),
            ),
    );
    builder.build()
}

/// `WidgetsLegacy` 1.0, an earlier version of [`widgets_v2`], with `IWidget` at index 0.
pub fn widgets_v1() -> TypeLib {
    let mut builder = TypeLibBuilder::new("WidgetsLegacy", LIBID_WIDGETS).version(1, 0);
    builder.add_type(
        TypeInfoBuilder::new("IWidget", TypeKind::Interface)
            .guid(guid!("57000000-0000-4000-8000-000000000101"))
            .function(FuncBuilder::new("Spin", 1)),
    );
    builder.build()
}

/// `Widgets` 2.0: `IWidget2` at index 0 takes the 1.0 `IWidget`, referenced by index.
pub fn widgets_v2() -> TypeLib {
    let mut builder = TypeLibBuilder::new("Widgets", LIBID_WIDGETS).version(2, 0);
    let legacy = builder.import_library(
        LibraryIdentity {
            guid: LIBID_WIDGETS,
            major: 1,
            minor: 0,
            lcid: 0,
        },
        "WidgetsLegacy.tlb",
    );
    let old = builder.import_type_by_index(legacy, 0);
    builder.add_type(
        TypeInfoBuilder::new("IWidget2", TypeKind::Interface)
            .guid(guid!("57000000-0000-4000-8000-000000000201"))
            .function(
                FuncBuilder::new("Upgrade", 1)
                    .param("old", TypeDesc::ptr(TypeDesc::UserDefined(old)), ParamFlags::IN),
            ),
    );
    builder.build()
}

/// `Geometry` 1.0 with the record `POINT`, which has no GUID.
pub fn geometry_library() -> TypeLib {
    let mut builder = TypeLibBuilder::new("Geometry", LIBID_GEOMETRY).version(1, 0);
    builder.add_type(
        TypeInfoBuilder::new("POINT", TypeKind::Record)
            .variable(VarBuilder::new("x", TypeDesc::Base(VarType::I4)))
            .variable(VarBuilder::new("y", TypeDesc::Base(VarType::I4))),
    );
    builder.build()
}

/// `Canvas` 1.0 with `SHAPE { POINT origin; }`, `POINT` referenced by index into [`geometry_library`].
pub fn canvas_library() -> TypeLib {
    let mut builder = TypeLibBuilder::new("Canvas", LIBID_CANVAS).version(1, 0);
    let geometry = builder.import_library(
        LibraryIdentity {
            guid: LIBID_GEOMETRY,
            major: 1,
            minor: 0,
            lcid: 0,
        },
        "Geometry.tlb",
    );
    let point = builder.import_type_by_index(geometry, 0);
    builder.add_type(
        TypeInfoBuilder::new("SHAPE", TypeKind::Record)
            .variable(VarBuilder::new("origin", TypeDesc::UserDefined(point))),
    );
    builder.build()
}
