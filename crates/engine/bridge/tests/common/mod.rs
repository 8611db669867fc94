//! Shared fixture: a small reflected world with one of every descriptor kind

#![allow(dead_code)]

use bridge::{BridgeConfig, ScriptRuntime};
use reflect::{
    ClassBuilder, ClassId, EnumId, FunctionBuilder, Host, IntKind, NativeValue, ObjectId,
    ParamRole, PropertyClass, PropertyDesc, Signature, StructId, StructValue, TypeRegistry,
};
use std::rc::Rc;

// Actor field offsets
pub const HEALTH: usize = 0;
pub const SPEED: usize = 1;
pub const LABEL: usize = 2;
pub const LOCATION: usize = 3;
pub const TAGS: usize = 4;
pub const SCORES: usize = 5;
pub const FLAGS: usize = 6;
pub const SLOTS: usize = 7;
pub const COLOR: usize = 8;
pub const TARGET: usize = 9;
pub const ON_HIT: usize = 10;
pub const ON_DEATH: usize = 11;
pub const HANDLE: usize = 12;
pub const POINTS: usize = 13;
pub const SERIAL: usize = 14;

pub struct World {
    pub host: Rc<Host>,
    pub object: ClassId,
    pub actor: ClassId,
    pub hero_class: ClassId,
    pub library: ClassId,
    pub vector: StructId,
    pub color: EnumId,
    /// Permanent actor named "Hero" of class `Hero`
    pub hero: ObjectId,
    /// Permanent actor named "Villain" of class `Actor`
    pub villain: ObjectId,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn int32() -> PropertyClass {
    PropertyClass::Int(IntKind::I32)
}

pub fn vector(id: StructId, x: f64, y: f64, z: f64) -> NativeValue {
    NativeValue::Struct(StructValue {
        id,
        fields: vec![NativeValue::F64(x), NativeValue::F64(y), NativeValue::F64(z)],
    })
}

fn hit_signature() -> Rc<Signature> {
    Rc::new(Signature::new(vec![
        PropertyDesc::new("Amount", int32()).with_role(ParamRole::In),
        PropertyDesc::new("ReturnValue", int32()).with_role(ParamRole::Return),
    ]))
}

fn death_signature() -> Rc<Signature> {
    Rc::new(Signature::new(vec![
        PropertyDesc::new("Reason", PropertyClass::Str).with_role(ParamRole::In),
    ]))
}

/// Run the actor's `OnHit` delegate with `amount`, returning its result
fn fire(host: &Host, actor: ObjectId, amount: i32) -> reflect::Result<NativeValue> {
    let NativeValue::Delegate(delegate) = host.read_field(actor, ON_HIT)? else {
        return Err(reflect::Error::Native("OnHit is not a delegate".into()));
    };
    let mut params = vec![NativeValue::I32(amount), NativeValue::I32(0)];
    delegate.execute_if_bound(host, &mut params)?;
    Ok(params.swap_remove(1))
}

pub fn world() -> World {
    init_tracing();
    let mut reg = TypeRegistry::new();

    let vector_id = reg
        .add_struct(
            "FVector",
            vec![
                ("X", PropertyClass::Double),
                ("Y", PropertyClass::Double),
                ("Z", PropertyClass::Double),
            ],
        )
        .unwrap();
    let color = reg
        .add_enum(
            "EColor",
            IntKind::U8,
            vec![("Red", 0), ("Green", 1), ("Blue", 2)],
        )
        .unwrap();

    let object = reg.add_class(ClassBuilder::new("Object")).unwrap();
    let actor = reg
        .add_class(
            ClassBuilder::new("Actor")
                .parent(object)
                .property("Health", int32())
                .property("Speed", PropertyClass::Float)
                .property("Label", PropertyClass::Str)
                .property("Location", PropertyClass::Struct(vector_id))
                .property("Tags", PropertyClass::Array(PropertyDesc::element(PropertyClass::Str)))
                .property(
                    "Scores",
                    PropertyClass::Map(
                        PropertyDesc::element(PropertyClass::Str),
                        PropertyDesc::element(int32()),
                    ),
                )
                .property("Flags", PropertyClass::Set(PropertyDesc::element(int32())))
                .fixed_array("Slots", int32(), 3)
                .property(
                    "Color",
                    PropertyClass::Enum {
                        id: color,
                        underlying: IntKind::U8,
                    },
                )
                .property("Target", PropertyClass::Object(object))
                .property("OnHit", PropertyClass::Delegate(hit_signature()))
                .property("OnDeath", PropertyClass::MulticastDelegate(death_signature()))
                .property("Handle", PropertyClass::Opaque("FSoftHandle".into()))
                .property(
                    "Points",
                    PropertyClass::Array(PropertyDesc::element(PropertyClass::Struct(vector_id))),
                )
                .property("Serial", PropertyClass::Int(IntKind::U64))
                .function(
                    FunctionBuilder::new("GetHealth")
                        .returns(int32())
                        .native(|call| {
                            let health = call.host.read_field(call.target()?, HEALTH)?;
                            call.set(0, health)
                        }),
                )
                .function(
                    FunctionBuilder::new("SetHealth")
                        .arg("Value", int32())
                        .native(|call| {
                            let value = call.int(0)? as i32;
                            call.host
                                .write_field(call.target()?, HEALTH, NativeValue::I32(value))
                        }),
                )
                .function(
                    FunctionBuilder::new("Describe")
                        .arg("Value", int32())
                        .returns(PropertyClass::Str)
                        .native(|call| {
                            let text = format!("int:{}", call.int(0)?);
                            call.set(1, NativeValue::Str(text))
                        }),
                )
                .function(
                    FunctionBuilder::new("Describe")
                        .arg("Value", PropertyClass::Str)
                        .returns(PropertyClass::Str)
                        .native(|call| {
                            let text = format!("str:{}", call.str(0)?);
                            call.set(1, NativeValue::Str(text))
                        }),
                )
                .function(
                    FunctionBuilder::new("Split")
                        .arg("Input", PropertyClass::Str)
                        .param("Left", PropertyClass::Str, ParamRole::Out)
                        .param("Right", PropertyClass::Str, ParamRole::Out)
                        .returns(PropertyClass::Bool)
                        .native(|call| {
                            let input = call.str(0)?.to_string();
                            match input.split_once(',') {
                                Some((left, right)) => {
                                    call.set(1, NativeValue::Str(left.to_string()))?;
                                    call.set(2, NativeValue::Str(right.to_string()))?;
                                    call.set(3, NativeValue::Bool(true))
                                }
                                None => call.set(3, NativeValue::Bool(false)),
                            }
                        }),
                )
                .function(
                    FunctionBuilder::new("Offset")
                        .param("Point", PropertyClass::Struct(vector_id), ParamRole::ByRef)
                        .arg("Amount", PropertyClass::Double)
                        .is_static()
                        .native(|call| {
                            let amount = call.float(1)?;
                            let point = shift_x(call.param(0)?, amount);
                            call.set(0, point)
                        }),
                )
                .function(
                    FunctionBuilder::new("Bump")
                        .param("Count", int32(), ParamRole::InOut)
                        .is_static()
                        .native(|call| {
                            let count = call.int(0)?;
                            call.set(0, NativeValue::I32(count as i32 + 1))
                        }),
                )
                .function(
                    FunctionBuilder::new("Relay")
                        .arg("Value", int32())
                        .param("Echo", int32(), ParamRole::Out)
                        .native(|call| {
                            let value = call.int(0)? as i32;
                            // Script may re-enter Relay from here
                            fire(call.host, call.target()?, value)?;
                            let echo = call.int(0)? as i32;
                            call.set(1, NativeValue::I32(echo))
                        }),
                )
                .function(
                    FunctionBuilder::new("Fire")
                        .arg("Amount", int32())
                        .returns(int32())
                        .native(|call| {
                            let amount = call.int(0)? as i32;
                            let result = fire(call.host, call.target()?, amount)?;
                            call.set(1, result)
                        }),
                )
                .function(
                    FunctionBuilder::new("Die")
                        .arg("Reason", PropertyClass::Str)
                        .native(|call| {
                            let reason = call.str(0)?.to_string();
                            let NativeValue::Multicast(multicast) =
                                call.host.read_field(call.target()?, ON_DEATH)?
                            else {
                                return Err(reflect::Error::Native("OnDeath is not multicast".into()));
                            };
                            multicast.broadcast(call.host, &[NativeValue::Str(reason)])
                        }),
                )
                .function(
                    FunctionBuilder::new("Attach")
                        .arg("Handle", PropertyClass::Opaque("FSoftHandle".into()))
                        .native(|_| Ok(())),
                )
                .function(
                    FunctionBuilder::new("Greet")
                        .returns(PropertyClass::Str)
                        .overridable()
                        .native(|call| call.set(0, NativeValue::Str("actor".into()))),
                ),
        )
        .unwrap();

    let hero_class = reg
        .add_class(
            ClassBuilder::new("Hero").parent(actor).function(
                FunctionBuilder::new("Greet")
                    .returns(PropertyClass::Str)
                    .overridable()
                    .native(|call| call.set(0, NativeValue::Str("hero".into()))),
            ),
        )
        .unwrap();

    let library = reg
        .add_class(
            ClassBuilder::new("MathLibrary")
                .function(
                    FunctionBuilder::new("Add")
                        .arg("A", int32())
                        .arg("B", int32())
                        .returns(int32())
                        .is_static()
                        .native(|call| {
                            let sum = call.int(0)? + call.int(1)?;
                            call.set(2, NativeValue::I32(sum as i32))
                        }),
                )
                .function(
                    FunctionBuilder::new("Length")
                        .arg("V", PropertyClass::Struct(vector_id))
                        .returns(PropertyClass::Double)
                        .is_static()
                        .native(|call| {
                            let NativeValue::Struct(v) = call.param(0)? else {
                                return Err(reflect::Error::Native("not a vector".into()));
                            };
                            let sum: f64 = v
                                .fields
                                .iter()
                                .map(|f| f.as_float().unwrap_or(0.0).powi(2))
                                .sum();
                            call.set(1, NativeValue::F64(sum.sqrt()))
                        }),
                )
                // Writes its outputs, then fails
                .function(
                    FunctionBuilder::new("Nudge")
                        .param("Point", PropertyClass::Struct(vector_id), ParamRole::ByRef)
                        .arg("Step", int32())
                        .param("Note", PropertyClass::Str, ParamRole::Out)
                        .is_static()
                        .native(|call| {
                            let step = call.int(1)? as f64;
                            let point = shift_x(call.param(0)?, step * 100.0);
                            call.set(0, point)?;
                            call.set(2, NativeValue::Str("first".into()))?;
                            Err(reflect::Error::Native("Nudge rejects integer steps".into()))
                        }),
                )
                .function(
                    FunctionBuilder::new("Nudge")
                        .param("Point", PropertyClass::Struct(vector_id), ParamRole::ByRef)
                        .arg("Step", PropertyClass::Double)
                        .param("Note", PropertyClass::Str, ParamRole::Out)
                        .is_static()
                        .native(|call| {
                            let step = call.float(1)?;
                            let point = shift_x(call.param(0)?, step);
                            call.set(0, point)?;
                            call.set(2, NativeValue::Str("second".into()))
                        }),
                ),
        )
        .unwrap();

    let host = Rc::new(Host::new(reg));
    let hero = host.spawn(hero_class, "Hero").unwrap();
    let villain = host.spawn(actor, "Villain").unwrap();
    host.write_field(hero, HEALTH, NativeValue::I32(100)).unwrap();

    World {
        host,
        object,
        actor,
        hero_class,
        library,
        vector: vector_id,
        color,
        hero,
        villain,
    }
}

/// `point` with `amount` added to its X
fn shift_x(point: &NativeValue, amount: f64) -> NativeValue {
    let mut point = point.clone();
    if let NativeValue::Struct(s) = &mut point {
        let x = s.fields[0].as_float().unwrap_or(0.0);
        s.fields[0] = NativeValue::F64(x + amount);
    }
    point
}

/// A runtime over a fresh world, with `hero` and `villain` globals set
pub fn runtime() -> (World, ScriptRuntime) {
    runtime_with(BridgeConfig::default())
}

pub fn runtime_with(config: BridgeConfig) -> (World, ScriptRuntime) {
    let world = world();
    let rt = ScriptRuntime::with_config(Rc::clone(&world.host), config).unwrap();
    let hero = rt.push_object(world.hero).unwrap();
    let villain = rt.push_object(world.villain).unwrap();
    rt.set_global("hero", hero).unwrap();
    rt.set_global("villain", villain).unwrap();
    (world, rt)
}
