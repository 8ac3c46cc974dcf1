// ABOUTME: Benchmark of the optimized field path against the JSON fallback and of container fast paths.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use optimized_marshaller::{
    ClassBuilder, FieldKind, Marshaller, Object, ObjectRef, PrimitiveArray, Registry, Value,
};
use std::sync::Arc;

fn registry() -> Arc<Registry> {
    let registry = Registry::new();
    for (name, fallback) in [("bench.Account", false), ("bench.LegacyAccount", true)] {
        let mut builder = ClassBuilder::new(name)
            .field("id", FieldKind::Long)
            .field("age", FieldKind::Int)
            .field("active", FieldKind::Boolean)
            .field("name", FieldKind::Other)
            .field("email", FieldKind::Other);
        if fallback {
            builder = builder.fallback();
        }
        registry.register(builder).unwrap();
    }
    registry
        .register(
            ClassBuilder::new("bench.Node")
                .field("id", FieldKind::Int)
                .field("next", FieldKind::Other),
        )
        .unwrap();
    Arc::new(registry)
}

fn account(registry: &Registry, type_name: &str, i: i64) -> Value {
    let inst = registry
        .instantiate(type_name)
        .unwrap()
        .with("id", 12_345_678_901_234 + i)
        .unwrap()
        .with("age", 30)
        .unwrap()
        .with("active", true)
        .unwrap()
        .with("name", format!("User {i}"))
        .unwrap()
        .with("email", format!("user{i}@example.com"))
        .unwrap();
    Value::Object(inst.into_ref())
}

fn ring(registry: &Registry, len: i32) -> Value {
    let nodes: Vec<ObjectRef> = (0..len)
        .map(|i| registry.instantiate("bench.Node").unwrap().with("id", i).unwrap().into_ref())
        .collect();
    for (i, node) in nodes.iter().enumerate() {
        let next = nodes[(i + 1) % nodes.len()].clone();
        node.set_field("next", next).unwrap();
    }
    Value::Object(nodes[0].clone())
}

fn bench_instance(c: &mut Criterion) {
    let registry = registry();
    let marshaller = Marshaller::new(registry.clone());
    let optimized = account(&registry, "bench.Account", 0);
    let fallback = account(&registry, "bench.LegacyAccount", 0);

    let mut group = c.benchmark_group("single_instance");

    group.bench_function("fields_encode", |b| {
        b.iter(|| marshaller.marshal(black_box(&optimized)).unwrap())
    });

    group.bench_function("fallback_encode", |b| {
        b.iter(|| marshaller.marshal(black_box(&fallback)).unwrap())
    });

    let optimized_bytes = marshaller.marshal(&optimized).unwrap();
    let fallback_bytes = marshaller.marshal(&fallback).unwrap();

    group.bench_function("fields_decode", |b| {
        b.iter(|| marshaller.unmarshal(black_box(&optimized_bytes)).unwrap())
    });

    group.bench_function("fallback_decode", |b| {
        b.iter(|| marshaller.unmarshal(black_box(&fallback_bytes)).unwrap())
    });

    println!(
        "Instance sizes: fields={} bytes, fallback={} bytes",
        optimized_bytes.len(),
        fallback_bytes.len()
    );

    group.finish();
}

fn bench_int_array(c: &mut Criterion) {
    let marshaller = Marshaller::new(registry());
    let ints: Vec<i32> = (0..1000).collect();
    let primitive = Value::Object(ObjectRef::new(Object::Primitives(PrimitiveArray::Int(
        ints.clone(),
    ))));
    let boxed = Value::Object(ObjectRef::new(Object::List(
        ints.iter().copied().map(Value::Int).collect(),
    )));

    let mut group = c.benchmark_group("integer_array_1000");
    group.throughput(Throughput::Elements(ints.len() as u64));

    group.bench_function("primitive_encode", |b| {
        b.iter(|| marshaller.marshal(black_box(&primitive)).unwrap())
    });

    group.bench_function("boxed_list_encode", |b| {
        b.iter(|| marshaller.marshal(black_box(&boxed)).unwrap())
    });

    let primitive_bytes = marshaller.marshal(&primitive).unwrap();
    let boxed_bytes = marshaller.marshal(&boxed).unwrap();

    group.bench_function("primitive_decode", |b| {
        b.iter(|| marshaller.unmarshal(black_box(&primitive_bytes)).unwrap())
    });

    group.bench_function("boxed_list_decode", |b| {
        b.iter(|| marshaller.unmarshal(black_box(&boxed_bytes)).unwrap())
    });

    println!(
        "Integer array sizes: primitive={} bytes, boxed={} bytes",
        primitive_bytes.len(),
        boxed_bytes.len()
    );

    group.finish();
}

fn bench_shared_graph(c: &mut Criterion) {
    let registry = registry();
    let marshaller = Marshaller::new(registry.clone());
    let accounts: Vec<Value> = (0..100)
        .map(|i| account(&registry, "bench.Account", i))
        .collect();
    // Every account appears twice; the second occurrence is a back-reference.
    let list = Value::Object(ObjectRef::new(Object::List(
        accounts.iter().chain(accounts.iter()).cloned().collect(),
    )));
    let cycle = ring(&registry, 100);

    let mut group = c.benchmark_group("graphs");

    group.bench_function("shared_list_encode", |b| {
        b.iter(|| marshaller.marshal(black_box(&list)).unwrap())
    });

    group.bench_function("ring_encode", |b| {
        b.iter(|| marshaller.marshal(black_box(&cycle)).unwrap())
    });

    let list_bytes = marshaller.marshal(&list).unwrap();
    let ring_bytes = marshaller.marshal(&cycle).unwrap();

    group.bench_function("shared_list_decode", |b| {
        b.iter(|| marshaller.unmarshal(black_box(&list_bytes)).unwrap())
    });

    group.bench_function("ring_decode", |b| {
        b.iter(|| marshaller.unmarshal(black_box(&ring_bytes)).unwrap())
    });

    println!(
        "Graph sizes: shared list={} bytes, ring={} bytes",
        list_bytes.len(),
        ring_bytes.len()
    );

    group.finish();
}

criterion_group!(benches, bench_instance, bench_int_array, bench_shared_graph);
criterion_main!(benches);
