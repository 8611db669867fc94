//! Container proxy tests
//!
//! Covers array/map/set operations on live fields, copying between
//! containers (script-owned and native), and proxies outliving their owner.

mod common;

use common::{runtime, vector, FLAGS, POINTS, SCORES, SLOTS, TAGS};
use reflect::NativeValue;

fn strings(items: &[&str]) -> NativeValue {
    NativeValue::Array(items.iter().map(|s| NativeValue::Str(s.to_string())).collect())
}

/// Map entries as a sorted list, ignoring storage order
fn sorted_entries(value: NativeValue) -> Vec<(String, i64)> {
    let NativeValue::Map(entries) = value else {
        panic!("Expected a map, got {:?}", value);
    };
    let mut entries: Vec<(String, i64)> = entries
        .into_iter()
        .map(|(k, v)| (k.as_str().unwrap().to_string(), v.as_int().unwrap() as i64))
        .collect();
    entries.sort();
    entries
}

fn sorted_set(value: NativeValue) -> Vec<i64> {
    let NativeValue::Set(items) = value else {
        panic!("Expected a set, got {:?}", value);
    };
    let mut items: Vec<i64> = items.iter().map(|v| v.as_int().unwrap() as i64).collect();
    items.sort();
    items
}

#[test]
fn test_array_operations() {
    let (world, rt) = runtime();
    let (first, second, found, missing, contains): (i64, i64, i64, Option<i64>, bool) = rt
        .eval(
            r#"
            local first = hero.Tags:Add("a")
            local second = hero.Tags:Add("b")
            hero.Tags:Insert(1, "z")
            return first, second, hero.Tags:Find("a"), hero.Tags:Find(5), hero.Tags:Contains("b")
            "#,
        )
        .unwrap();
    assert_eq!((first, second), (1, 2));
    assert_eq!(found, 2);
    assert_eq!(missing, None, "a value of the wrong type is simply not found");
    assert!(contains);
    assert_eq!(
        world.host.read_field(world.hero, TAGS).unwrap(),
        strings(&["z", "a", "b"])
    );

    rt.exec_string("hero.Tags:Remove(1); hero.Tags[2] = 'c'").unwrap();
    assert_eq!(world.host.read_field(world.hero, TAGS).unwrap(), strings(&["a", "c"]));

    let (len, text): (i64, String) = rt.eval("return #hero.Tags, tostring(hero.Tags)").unwrap();
    assert_eq!(len, 2);
    assert_eq!(text, "TArray<FString> (2 elements)");

    let err = rt.exec_string("local _ = hero.Tags[3]").unwrap_err();
    assert!(
        err.to_string().contains("Index 3 out of range (size 2)"),
        "unexpected error: {}",
        err
    );
    assert!(rt.exec_string("hero.Tags:Insert(5, 'x')").is_err());
}

#[test]
fn test_array_iteration_snapshot() {
    let (_world, rt) = runtime();
    let joined: String = rt
        .eval(
            r#"
            hero.Tags = { "a", "b" }
            local out = {}
            for i, v in pairs(hero.Tags) do
                out[#out + 1] = i .. "=" .. v
                hero.Tags:Add("late")
            end
            return table.concat(out, ",")
            "#,
        )
        .unwrap();
    assert_eq!(joined, "1=a,2=b");
}

#[test]
fn test_array_of_structs_is_addressable() {
    let (world, rt) = runtime();
    rt.exec_string(
        r#"
        hero.Points:Add({ X = 1 })
        hero.Points[1].X = 9
        local point = hero.Points[1]
        point.Y = 2
        "#,
    )
    .unwrap();
    assert_eq!(
        world.host.read_field(world.hero, POINTS).unwrap(),
        NativeValue::Array(vec![vector(world.vector, 9.0, 2.0, 0.0)])
    );
}

#[test]
fn test_map_operations() {
    let (world, rt) = runtime();
    let (alice, carol, len, key): (i64, Option<i64>, i64, String) = rt
        .eval(
            r#"
            hero.Scores.alice = 3
            hero.Scores:Add("bob", 4)
            local alice = hero.Scores:Find("alice")
            local carol = hero.Scores.carol
            hero.Scores.alice = nil
            return alice, carol, hero.Scores:Num(), hero.Scores:Keys()[1]
            "#,
        )
        .unwrap();
    assert_eq!(alice, 3);
    assert_eq!(carol, None);
    assert_eq!(len, 1);
    assert_eq!(key, "bob");
    assert_eq!(
        sorted_entries(world.host.read_field(world.hero, SCORES).unwrap()),
        vec![("bob".to_string(), 4)]
    );

    let (removed, again, has): (bool, bool, bool) = rt
        .eval(
            r#"
            hero.Scores:Add("dan", 1)
            return hero.Scores:Remove("bob"), hero.Scores:Remove("bob"), hero.Scores:Contains("dan")
            "#,
        )
        .unwrap();
    assert!(removed);
    assert!(!again);
    assert!(has);
}

#[test]
fn test_set_operations() {
    let (world, rt) = runtime();
    let (added, duplicate, five, seven): (bool, bool, bool, bool) = rt
        .eval(
            r#"
            local added = hero.Flags:Add(5)
            local duplicate = hero.Flags:Add(5)
            hero.Flags[6] = true
            return added, duplicate, hero.Flags[5], hero.Flags[7]
            "#,
        )
        .unwrap();
    assert!(added);
    assert!(!duplicate);
    assert!(five);
    assert!(!seven);
    assert_eq!(sorted_set(world.host.read_field(world.hero, FLAGS).unwrap()), vec![5, 6]);

    let len: i64 = rt
        .eval("hero.Flags[5] = nil; return #hero.Flags:ToArray()")
        .unwrap();
    assert_eq!(len, 1);
}

#[test]
fn test_tables_are_deduplicated() {
    let (world, rt) = runtime();
    rt.exec_string("hero.Flags = { 3, 3, 4 }").unwrap();
    assert_eq!(sorted_set(world.host.read_field(world.hero, FLAGS).unwrap()), vec![3, 4]);

    rt.exec_string("hero.Flags = { [7] = true, [8] = true }").unwrap();
    assert_eq!(sorted_set(world.host.read_field(world.hero, FLAGS).unwrap()), vec![7, 8]);

    rt.exec_string("hero.Scores = { a = 1, b = 2 }").unwrap();
    assert_eq!(
        sorted_entries(world.host.read_field(world.hero, SCORES).unwrap()),
        vec![("a".to_string(), 1), ("b".to_string(), 2)]
    );
}

#[test]
fn test_set_tables_of_booleans() {
    let (world, rt) = runtime();
    let (len, yes, no): (i64, bool, bool) = rt
        .eval("local s = UE.TSet('bool', { true }); return s:Num(), s[true], s[false]")
        .unwrap();
    assert_eq!(len, 1);
    assert!(yes);
    assert!(!no);

    let len: i64 = rt
        .eval("return UE.TSet('bool', { true, false, true }):Num()")
        .unwrap();
    assert_eq!(len, 2);

    // Integer sets still read `{[e] = true}` as keys, even when they form a sequence
    rt.exec_string("hero.Flags = { [1] = true, [2] = true }").unwrap();
    assert_eq!(sorted_set(world.host.read_field(world.hero, FLAGS).unwrap()), vec![1, 2]);
}

#[test]
fn test_map_keys_named_like_methods() {
    let (world, rt) = runtime();
    let (found, method): (i64, String) = rt
        .eval(
            r#"
            hero.Scores["Keys"] = 1
            return hero.Scores:Find("Keys"), type(hero.Scores.Keys)
            "#,
        )
        .unwrap();
    assert_eq!(found, 1);
    assert_eq!(method, "function");
    assert_eq!(
        sorted_entries(world.host.read_field(world.hero, SCORES).unwrap()),
        vec![("Keys".to_string(), 1)]
    );
}

#[test]
fn test_copy_is_idempotent() {
    let (world, rt) = runtime();
    rt.exec_string(
        r#"
        local scores = UE.TMap("FString", "int32", { a = 1, b = 2 })
        hero.Scores = scores
        hero.Scores = scores
        local flags = UE.TSet("int32", { 1, 2 })
        hero.Flags = flags
        hero.Flags:CopyFrom(flags)
        villain.Scores = hero.Scores
        villain.Scores = hero.Scores
        "#,
    )
    .unwrap();
    let expected = vec![("a".to_string(), 1), ("b".to_string(), 2)];
    assert_eq!(
        sorted_entries(world.host.read_field(world.hero, SCORES).unwrap()),
        expected
    );
    assert_eq!(
        sorted_entries(world.host.read_field(world.villain, SCORES).unwrap()),
        expected
    );
    assert_eq!(sorted_set(world.host.read_field(world.hero, FLAGS).unwrap()), vec![1, 2]);
}

#[test]
fn test_assignment_copies_contents() {
    let (world, rt) = runtime();
    let (field_len, glue_len): (i64, i64) = rt
        .eval(
            r#"
            local tags = UE.TArray("FString", { "x", "y" })
            hero.Tags = tags
            tags:Add("z")
            return hero.Tags:Num(), tags:Num()
            "#,
        )
        .unwrap();
    assert_eq!((field_len, glue_len), (2, 3));

    rt.exec_string("villain.Tags = hero.Tags; hero.Tags:Add('w')").unwrap();
    assert_eq!(world.host.read_field(world.villain, TAGS).unwrap(), strings(&["x", "y"]));
    assert_eq!(
        world.host.read_field(world.hero, TAGS).unwrap(),
        strings(&["x", "y", "w"])
    );
}

#[test]
fn test_element_conversion() {
    let (world, rt) = runtime();
    // Different element types go through Lua one element at a time
    rt.exec_string("hero.Slots = UE.TArray('int64', { 8, 9 })").unwrap();
    assert_eq!(
        world.host.read_field(world.hero, SLOTS).unwrap(),
        NativeValue::Array(vec![NativeValue::I32(8), NativeValue::I32(9), NativeValue::I32(0)])
    );

    let err = rt
        .exec_string("hero.Tags = UE.TArray('int32', { 1, 2 })")
        .unwrap_err();
    assert!(err.to_string().contains("expected FString"), "unexpected error: {}", err);
    let err = rt.exec_string("hero.Tags = hero.Scores").unwrap_err();
    assert!(err.to_string().contains("Type mismatch"), "unexpected error: {}", err);
    assert!(rt.exec_string("hero.Tags = 5").is_err());
}

#[test]
fn test_copy_to_tables_and_proxies() {
    let (world, rt) = runtime();
    let (first, len): (String, i64) = rt
        .eval(
            r#"
            hero.Tags = { "p", "q" }
            local copy = hero.Tags:CopyTo()
            local reused = hero.Tags:CopyTo({ "stale", "stale", "stale" })
            hero.Tags:CopyTo(villain.Tags)
            return copy[1], #reused
            "#,
        )
        .unwrap();
    assert_eq!(first, "p");
    assert_eq!(len, 2);
    assert_eq!(world.host.read_field(world.villain, TAGS).unwrap(), strings(&["p", "q"]));

    let snapshot: i64 = rt
        .eval("local t = hero.Scores:ToTable(); hero.Scores.k = 1; return t.k == nil and 1 or 0")
        .unwrap();
    assert_eq!(snapshot, 1);
}

#[test]
fn test_proxy_outliving_owner_is_dangling() {
    let (world, rt) = runtime();
    rt.exec_string("tags = villain.Tags; tags:Add('kept')").unwrap();
    world.host.destroy(world.villain);

    let err = rt.exec_string("return tags:Num()").unwrap_err();
    assert!(err.to_string().contains("Dangling reference"), "unexpected error: {}", err);
    let text: String = rt.eval("return tostring(tags)").unwrap();
    assert_eq!(text, "TArray<FString> (dangling)");
}

#[test]
fn test_script_containers() {
    let (_world, rt) = runtime();
    let (len, x, text): (i64, f64, String) = rt
        .eval(
            r#"
            local points = UE.TArray("FVector", { { X = 1 }, { X = 2 } })
            points[2].X = 5
            local scores = UE.TMap("FString", "int32")
            return #points, points[2].X, tostring(scores)
            "#,
        )
        .unwrap();
    assert_eq!(len, 2);
    assert_eq!(x, 5.0);
    assert_eq!(text, "TMap<FString, int32> (0 elements)");

    let err = rt.exec_string("UE.TArray('Nope')").unwrap_err();
    assert!(err.to_string().contains("Unknown name: Nope"), "unexpected error: {}", err);
}
