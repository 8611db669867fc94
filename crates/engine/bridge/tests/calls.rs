//! Call marshalling tests
//!
//! Output parameters, by-reference updates, re-entrant calls, overload
//! dispatch, delegates and the error funnel.

mod common;

use bridge::{Binding, BoundFunction, BridgeConfig, ErrorReport, ScriptRuntime};
use common::{runtime, runtime_with, world, HEALTH};
use mlua::prelude::*;
use reflect::NativeValue;
use std::cell::RefCell;
use std::rc::Rc;

/// Collect every funneled error message
fn capture_errors(rt: &ScriptRuntime) -> Rc<RefCell<Vec<String>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    rt.set_error_notifier(move |report: &ErrorReport| {
        sink.borrow_mut().push(report.message.clone());
    });
    seen
}

#[test]
fn test_member_and_static_calls() {
    let (world, rt) = runtime();
    let (health, sum, defaulted): (i64, i64, i64) = rt
        .eval(
            r#"
            hero:SetHealth(55)
            return hero:GetHealth(), UE.MathLibrary.Add(2, 3), UE.MathLibrary.Add(2)
            "#,
        )
        .unwrap();
    assert_eq!(health, 55);
    assert_eq!(sum, 5);
    assert_eq!(defaulted, 2, "missing trailing arguments keep their default");
    assert_eq!(world.host.read_field(world.hero, HEALTH).unwrap(), NativeValue::I32(55));
}

#[test]
fn test_out_and_inout_parameters() {
    let (_world, rt) = runtime();
    let (ok, left, right): (bool, String, String) = rt.eval("return hero:Split('a,b')").unwrap();
    assert!(ok);
    assert_eq!(left, "a");
    assert_eq!(right, "b");

    let (ok, left): (bool, String) = rt.eval("return hero:Split('ab')").unwrap();
    assert!(!ok);
    assert_eq!(left, "", "unwritten outputs come back default-constructed");

    let bumped: i64 = rt.eval("return UE.Actor.Bump(4)").unwrap();
    assert_eq!(bumped, 5);
}

#[test]
fn test_by_ref_updates_callers_handle() {
    let (_world, rt) = runtime();
    let (same, x, field_x): (bool, f64, f64) = rt
        .eval(
            r#"
            local point = UE.FVector.new({ X = 1 })
            local returned = UE.Actor.Offset(point, 2)
            hero.Location = { X = 10 }
            UE.Actor.Offset(hero.Location, 5)
            return rawequal(point, returned), point.X, hero.Location.X
            "#,
        )
        .unwrap();
    assert!(same, "a compatible handle is updated in place and returned");
    assert_eq!(x, 3.0);
    assert_eq!(field_x, 15.0);

    // A table has no identity to keep; a fresh value comes back
    let x: f64 = rt
        .eval("local p = UE.Actor.Offset({ X = 1 }, 1); return p.X")
        .unwrap();
    assert_eq!(x, 2.0);
}

#[test]
fn test_reentrant_calls_keep_their_arguments() {
    let (_world, rt) = runtime();
    let (echo, inner): (i64, String) = rt
        .eval(
            r#"
            local inner = {}
            hero.OnHit:Bind(function(amount)
                if amount > 0 then
                    inner[#inner + 1] = hero:Relay(amount - 1)
                end
                return amount
            end)
            local echo = hero:Relay(3)
            return echo, table.concat(inner, ",")
            "#,
        )
        .unwrap();
    assert_eq!(echo, 3, "outer call must see its own arguments after re-entry");
    assert_eq!(inner, "0,1,2");
}

#[test]
fn test_reentry_limit() {
    let config = BridgeConfig {
        max_reentry_depth: 2,
        ..BridgeConfig::default()
    };
    let (_world, rt) = runtime_with(config);
    let errors = capture_errors(&rt);

    let ok: bool = rt
        .eval(
            r#"
            hero.OnHit = function(amount) return hero:Relay(amount) end
            return (pcall(hero.Relay, hero, 1))
            "#,
        )
        .unwrap();
    assert!(!ok, "unbounded recursion should hit the limit");
    assert_eq!(
        errors.borrow()[0],
        "Re-entry limit of 2 reached calling Actor.Relay"
    );

    // Depth is restored once the failed calls unwind
    let echo: i64 = rt
        .eval("hero.OnHit = function(a) return a end; return hero:Relay(9)")
        .unwrap();
    assert_eq!(echo, 9);
}

#[test]
fn test_overload_dispatch() {
    let (_world, rt) = runtime();
    let errors = capture_errors(&rt);
    let (int, string, alias): (String, String, String) = rt
        .eval("return hero:Describe(5), hero:Describe('x'), hero:Describe2('y')")
        .unwrap();
    assert_eq!(int, "int:5");
    assert_eq!(string, "str:x");
    assert_eq!(alias, "str:y");

    let ok: bool = rt.eval("return (pcall(hero.Describe, hero, true))").unwrap();
    assert!(!ok);
    let message = errors.borrow().last().cloned().unwrap();
    assert!(
        message.starts_with("No overload of Describe accepted the arguments"),
        "unexpected error: {}",
        message
    );
    assert_eq!(message.lines().count(), 3, "one line per failed candidate");

    let ok: bool = rt.eval("return (pcall(hero.Describe1, hero, 'y'))").unwrap();
    assert!(!ok);
    assert_eq!(
        errors.borrow().last().unwrap(),
        "Actor.Describe: bad argument #2 (Value): Type mismatch: expected int32, got string"
    );
}

#[test]
fn test_failed_overload_leaves_no_outputs() {
    let (_world, rt) = runtime();
    let errors = capture_errors(&rt);
    let (note, x, same, count): (String, f64, bool, i64) = rt
        .eval(
            r#"
            point = UE.FVector.new({ X = 1 })
            local results = table.pack(UE.MathLibrary.Nudge(point, 2))
            return results[1], point.X, rawequal(results[2], point), results.n
            "#,
        )
        .unwrap();
    // The first candidate wrote X += 200 and "first" into its buffer before failing
    assert_eq!(note, "second");
    assert_eq!(x, 3.0);
    assert!(same, "by-ref output is the caller's handle");
    assert_eq!(count, 2);
    assert!(errors.borrow().is_empty(), "recovered candidates are not reported");

    let ok: bool = rt.eval("return (pcall(UE.MathLibrary.Nudge1, point, 2))").unwrap();
    assert!(!ok);
    let ok: bool = rt.eval("return (pcall(UE.MathLibrary.Nudge, point, 'far'))").unwrap();
    assert!(!ok);
    let x: f64 = rt.eval("return point.X").unwrap();
    assert_eq!(x, 3.0, "failed calls leave the by-ref argument alone");
    assert!(errors.borrow()[0].contains("Nudge rejects integer steps"));
}

#[test]
fn test_unsupported_function_fails_alone() {
    let (_world, rt) = runtime();
    let err = rt.exec_string("local _ = hero.Attach").unwrap_err();
    assert!(err.to_string().contains("Unknown name: Hero.Attach"), "unexpected error: {}", err);

    // The rest of the class is unaffected
    let health: i64 = rt.eval("return hero:GetHealth()").unwrap();
    assert_eq!(health, 100);
}

#[test]
fn test_invalid_targets() {
    let (_world, rt) = runtime();
    let errors = capture_errors(&rt);
    let (missing, wrong, unrelated): (bool, bool, bool) = rt
        .eval(
            r#"
            return (pcall(UE.Actor.GetHealth)),
                (pcall(UE.Actor.GetHealth, 5)),
                (pcall(UE.Hero.Greet, villain))
            "#,
        )
        .unwrap();
    assert!(!missing && !wrong && !unrelated);
    let errors = errors.borrow();
    assert_eq!(errors[0], "Actor.GetHealth must be called on a valid object");
    assert_eq!(errors[1], "Actor.GetHealth must be called on a valid object");
    assert!(errors[2].contains("not a valid target"), "unexpected error: {}", errors[2]);
}

#[test]
fn test_virtual_dispatch() {
    let (world, rt) = runtime();
    let before = world.host.invocation_count();
    let (hero, villain, through_base): (String, String, String) = rt
        .eval("return hero:Greet(), villain:Greet(), UE.Actor.Greet(hero)")
        .unwrap();
    assert_eq!(hero, "hero");
    assert_eq!(villain, "actor");
    assert_eq!(through_base, "hero", "overridable functions dispatch on the runtime class");
    assert_eq!(world.host.invocation_count(), before + 3);
}

#[test]
fn test_bound_function_from_rust() {
    let (world, rt) = runtime();
    let desc = world
        .host
        .registry()
        .find_functions(world.actor, "GetHealth")
        .remove(0);
    let function = BoundFunction::new(rt.context(), desc).unwrap();
    assert!(function.desc().is_fast_path());

    let hero = rt.push_object(world.hero).unwrap();
    let results = function.call(rt.lua(), rt.context(), &[hero]).unwrap();
    assert_eq!(results.into_vec(), vec![LuaValue::Integer(100)]);
    assert_eq!(function.frame().depth(), 0);
    assert_eq!(function.frame().fresh_buffers(), 0);
}

#[test]
fn test_bind_functions_and_fields() {
    let (world, rt) = runtime();
    let registry = world.host.registry();

    rt.bind("Sum", Binding::Functions(registry.find_functions(world.library, "Add")))
        .unwrap();
    rt.bind(
        "Stats",
        Binding::Fields {
            owner: world.hero,
            fields: vec![
                registry.find_property(world.actor, "Health").unwrap(),
                registry.find_property(world.actor, "Label").unwrap(),
            ],
        },
    )
    .unwrap();

    let (sum, health): (i64, i64) = rt
        .eval("UE.Stats.Label = 'bound'; return UE.Sum(4, 5), UE.Stats.Health")
        .unwrap();
    assert_eq!(sum, 9);
    assert_eq!(health, 100);
    assert_eq!(
        world.host.read_field(world.hero, common::LABEL).unwrap(),
        NativeValue::Str("bound".into())
    );
    assert!(rt.exec_string("local _ = UE.Stats.Speed").is_err());

    // Nothing marshals, nothing is installed
    let attach = registry.find_functions(world.actor, "Attach");
    assert!(rt.bind("Attach", Binding::Functions(attach)).is_err());
    let installed: bool = rt.eval("return rawget(UE, 'Attach') ~= nil").unwrap();
    assert!(!installed);
}

#[test]
fn test_delegates() {
    let (world, rt) = runtime();
    let (fired, bound, executed): (i64, bool, i64) = rt
        .eval(
            r#"
            hero.OnHit:Bind(function(amount) return amount * 2 end)
            return hero:Fire(21), hero.OnHit:IsBound(), hero.OnHit:Execute(4)
            "#,
        )
        .unwrap();
    assert_eq!(fired, 42);
    assert!(bound);
    assert_eq!(executed, 8);

    let (assigned, shared): (i64, i64) = rt
        .eval(
            r#"
            hero.OnHit = function(amount) return amount + 1 end
            villain.OnHit = hero.OnHit
            return hero:Fire(1), villain:Fire(10)
            "#,
        )
        .unwrap();
    assert_eq!(assigned, 2);
    assert_eq!(shared, 11);

    // nil results leave the slot as native code set it
    let kept: i64 = rt
        .eval("hero.OnHit = function() end; return hero:Fire(3)")
        .unwrap();
    assert_eq!(kept, 0);

    let unbound: i64 = rt.eval("hero.OnHit = nil; return hero:Fire(3)").unwrap();
    assert_eq!(unbound, 0);
    let err = rt.exec_string("hero.OnHit:Execute(1)").unwrap_err();
    assert!(err.to_string().contains("Delegate is not bound"), "unexpected error: {}", err);

    let err = rt
        .exec_string("hero.OnHit = function() error('boom') end; hero:Fire(1)")
        .unwrap_err();
    assert!(err.to_string().contains("boom"), "unexpected error: {}", err);

    let err = rt.exec_string("hero.OnHit = 5").unwrap_err();
    assert!(err.to_string().contains("Type mismatch"), "unexpected error: {}", err);
    assert!(matches!(
        world.host.read_field(world.hero, common::ON_HIT).unwrap(),
        NativeValue::Delegate(_)
    ));
}

#[test]
fn test_multicast_delegates() {
    let (_world, rt) = runtime();
    let (count, first, second, removed, bound): (i64, String, String, bool, bool) = rt
        .eval(
            r#"
            heard = {}
            local function listener(reason) heard[#heard + 1] = reason end
            hero.OnDeath:Add(listener)
            hero.OnDeath:Add(listener)
            hero:Die("fell")
            hero.OnDeath:Broadcast("again")
            local removed = hero.OnDeath:Remove(listener)
            hero:Die("ignored")
            return #heard, heard[1], heard[2], removed, hero.OnDeath:IsBound()
            "#,
        )
        .unwrap();
    assert_eq!(count, 2, "a function added twice is called once per broadcast");
    assert_eq!(first, "fell");
    assert_eq!(second, "again");
    assert!(removed);
    assert!(!bound);

    let err = rt
        .exec_string("hero.OnDeath = function() end")
        .unwrap_err();
    assert!(
        err.to_string().contains("Cannot assign to multicast delegate OnDeath"),
        "unexpected error: {}",
        err
    );
}

#[test]
fn test_error_notifier() {
    let (world, rt) = runtime();
    let errors = capture_errors(&rt);
    let before = rt.errors_reported();

    let ok: bool = rt.eval("return (pcall(hero.SetHealth, hero, 'x'))").unwrap();
    assert!(!ok);
    assert_eq!(rt.errors_reported(), before + 1);
    assert_eq!(
        errors.borrow().as_slice(),
        ["Actor.SetHealth: bad argument #2 (Value): Type mismatch: expected int32, got string"]
    );
    assert_eq!(world.host.read_field(world.hero, HEALTH).unwrap(), NativeValue::I32(100));

    rt.clear_error_notifier();
    let _ = rt.exec_string("hero.Health = 'x'");
    assert_eq!(errors.borrow().len(), 1);
    assert_eq!(rt.errors_reported(), before + 2);
}

#[test]
fn test_error_reports_carry_traceback() {
    let (_world, rt) = runtime();
    assert!(rt.config().capture_traceback);

    let reports = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&reports);
    rt.set_error_notifier(move |report: &ErrorReport| sink.borrow_mut().push(report.clone()));

    let _ = rt.exec_string("hero.Health = 'x'");
    let reports = reports.borrow();
    let traceback = reports[0].traceback.as_deref().unwrap_or_default();
    assert!(traceback.contains("stack traceback"), "missing traceback: {:?}", reports[0]);
    assert!(traceback.contains("\n\t"), "traceback has no frames: {:?}", reports[0]);
}

#[test]
fn test_traceback_with_debug_library() {
    let world = world();
    let lua = unsafe { Lua::unsafe_new() };
    let rt = ScriptRuntime::with_lua(lua, Rc::clone(&world.host), BridgeConfig::default()).unwrap();
    let hero = rt.push_object(world.hero).unwrap();
    rt.set_global("hero", hero).unwrap();

    let reports = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&reports);
    rt.set_error_notifier(move |report: &ErrorReport| sink.borrow_mut().push(report.clone()));

    let _ = rt.exec_string("hero.Health = 'x'");
    let reports = reports.borrow();
    assert!(reports[0].traceback.is_some());
}
