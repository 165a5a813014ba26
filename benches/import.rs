//! Benchmarks for the import pipeline.
//!
//! A synthetic library stands in for a large automation server:
//! - enums with many members
//! - records with mixed field widths
//! - dual interfaces with properties and optional parameters
//! - coclasses with source interfaces, which pull in event adapter synthesis

extern crate tlbscope;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use std::hint::black_box;
use tlbscope::{
    prelude::*,
    typelib::{desc::LibraryIdentity, TypeLibBuilder},
};
use uguid::{guid, Guid};

const IID_IDISPATCH: Guid = guid!("00020400-0000-0000-c000-000000000046");

/// Derive a distinct GUID for the `index`-th type of group `group`.
fn type_guid(group: u16, index: u32) -> Guid {
    let base = guid!("6b1d0000-0000-4000-8000-000000000000");
    let mut bytes = base.to_bytes();
    bytes[2..4].copy_from_slice(&group.to_le_bytes());
    bytes[12..16].copy_from_slice(&index.to_le_bytes());
    Guid::from_bytes(bytes)
}

/// A library with `scale` types of every kind.
fn synthetic_library(scale: u32) -> TypeLib {
    let mut builder = TypeLibBuilder::new("Synthetic", guid!("6b1d0000-0000-4000-8000-0000000000ff"))
        .version(3, 0);
    let stdole = builder.import_library(
        LibraryIdentity {
            guid: guid!("00020430-0000-0000-c000-000000000046"),
            major: 2,
            minor: 0,
            lcid: 0,
        },
        "stdole2.tlb",
    );
    let dispatch = builder.import_type_by_guid(stdole, IID_IDISPATCH);

    for i in 0..scale {
        let mut info = TypeInfoBuilder::new(format!("Mode{i}"), TypeKind::Enum);
        for member in 0..32 {
            info = info.constant(format!("Mode{i}_{member}"), Variant::I4(member));
        }
        builder.add_type(info);

        builder.add_type(
            TypeInfoBuilder::new(format!("RECORD{i}"), TypeKind::Record)
                .variable(VarBuilder::new("flags", TypeDesc::Base(VarType::UI2)))
                .variable(VarBuilder::new("count", TypeDesc::Base(VarType::I4)))
                .variable(VarBuilder::new("ratio", TypeDesc::Base(VarType::R8)))
                .variable(VarBuilder::new("label", TypeDesc::Base(VarType::Bstr))),
        );

        let mut interface = TypeInfoBuilder::new(format!("IWorker{i}"), TypeKind::Interface)
            .guid(type_guid(1, i))
            .flags(TypeFlags::DUAL | TypeFlags::OLEAUTOMATION)
            .inherits(dispatch);
        for method in 0..16 {
            interface = interface.function(
                FuncBuilder::new(format!("Run{method}"), 0x100 + method)
                    .param("count", TypeDesc::Base(VarType::I4), ParamFlags::IN)
                    .param_with_default(
                        "scale",
                        TypeDesc::Base(VarType::R8),
                        ParamFlags::IN | ParamFlags::OPT,
                        Variant::R8(1.0),
                    )
                    .retval("result", TypeDesc::Base(VarType::Bstr)),
            );
        }
        interface = interface
            .function(
                FuncBuilder::new("Name", 1)
                    .invoke(InvokeKind::PropertyGet)
                    .retval("value", TypeDesc::Base(VarType::Bstr)),
            )
            .function(
                FuncBuilder::new("Name", 1)
                    .invoke(InvokeKind::PropertyPut)
                    .param("value", TypeDesc::Base(VarType::Bstr), ParamFlags::IN),
            );
        let worker = builder.add_type(interface);

        let events = builder.add_type(
            TypeInfoBuilder::new(format!("DWorkerEvents{i}"), TypeKind::Dispatch)
                .guid(type_guid(2, i))
                .function(
                    FuncBuilder::new("Progress", 1)
                        .returns(TypeDesc::Base(VarType::Void))
                        .param("percent", TypeDesc::Base(VarType::I4), ParamFlags::IN),
                )
                .function(FuncBuilder::new("Done", 2).returns(TypeDesc::Base(VarType::Void))),
        );

        builder.add_type(
            TypeInfoBuilder::new(format!("Worker{i}"), TypeKind::CoClass)
                .guid(type_guid(3, i))
                .implements(worker, ImplTypeFlags::DEFAULT)
                .implements(events, ImplTypeFlags::DEFAULT | ImplTypeFlags::SOURCE),
        );
    }
    builder.build()
}

/// Benchmark importing a small library without serialization.
fn bench_import_small(c: &mut Criterion) {
    let library = synthetic_library(4);

    c.bench_function("import_small", |b| {
        b.iter_batched(
            || library.clone(),
            |library| {
                let result = Importer::default().import(black_box(library)).unwrap();
                black_box(result)
            },
            BatchSize::SmallInput,
        );
    });
}

/// Benchmark importing and serializing a large library.
fn bench_import_and_serialize(c: &mut Criterion) {
    let library = synthetic_library(64);

    c.bench_function("import_and_serialize_large", |b| {
        b.iter_batched(
            || library.clone(),
            |library| {
                let result = Importer::default().import(black_box(library)).unwrap();
                let bytes = result.assemblies[0].to_bytes().unwrap();
                black_box(bytes)
            },
            BatchSize::LargeInput,
        );
    });
}

/// Benchmark serialization alone, the metadata and PE writers.
fn bench_serialize(c: &mut Criterion) {
    let result = Importer::default().import(synthetic_library(64)).unwrap();
    let primary = result.primary().unwrap();

    c.bench_function("serialize_large", |b| {
        b.iter(|| {
            let bytes = primary.to_bytes().unwrap();
            black_box(bytes)
        });
    });
}

criterion_group!(
    benches,
    bench_import_small,
    bench_import_and_serialize,
    bench_serialize
);
criterion_main!(benches);
