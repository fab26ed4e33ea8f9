//! 内置示例模型，全部通过公开的增加操作构建。
use anyhow::{Result, bail};

use crate::net::{Arc, BinOp, Color, Net, NetError, Place, TokenKind, Transition, WeightExpr};

pub const MODEL_NAMES: [&str; 4] = [
    "mutex",
    "producer-consumer",
    "philosophers",
    "colored-buffer",
];

pub fn build(name: &str) -> Result<Net> {
    let net = match name {
        "mutex" => mutex()?,
        "producer-consumer" => producer_consumer(3)?,
        "philosophers" => philosophers(5)?,
        "colored-buffer" => colored_buffer()?,
        other => bail!("unknown model '{other}', expected one of {MODEL_NAMES:?}"),
    };
    log::info!(
        "built {name}: {} places, {} transitions, {} arcs",
        net.places_len(),
        net.transitions_len(),
        net.arcs_len()
    );
    Ok(net)
}

fn black_net() -> Result<Net, NetError> {
    let mut net = Net::empty();
    net.add_token_kind(TokenKind::new("black", Color::BLACK))?;
    Ok(net)
}

fn place(net: &mut Net, id: &str, tokens: i64) -> Result<(), NetError> {
    net.add_place(Place::new(id))?;
    if tokens > 0 {
        net.set_count(id, "black", tokens)?;
    }
    Ok(())
}

fn step(net: &mut Net, transition: &str, from: &[&str], to: &[&str]) -> Result<(), NetError> {
    net.add_transition(Transition::new(transition))?;
    for place in from {
        net.add_arc(Arc::input(*place, transition).with_weight("black", 1))?;
    }
    for place in to {
        net.add_arc(Arc::output(transition, *place).with_weight("black", 1))?;
    }
    Ok(())
}

/// Two processes sharing one lock.
pub fn mutex() -> Result<Net, NetError> {
    let mut net = black_net()?;
    place(&mut net, "Lock", 1)?;
    for i in 1..=2 {
        let idle = format!("Idle{i}");
        let critical = format!("Critical{i}");
        place(&mut net, &idle, 1)?;
        place(&mut net, &critical, 0)?;
        let (idle, critical) = (idle.as_str(), critical.as_str());
        step(&mut net, &format!("Enter{i}"), &[idle, "Lock"], &[critical])?;
        step(&mut net, &format!("Exit{i}"), &[critical], &[idle, "Lock"])?;
    }
    Ok(net)
}

/// One producer and one consumer around a buffer bounded by `capacity`.
pub fn producer_consumer(capacity: u64) -> Result<Net, NetError> {
    let mut net = black_net()?;
    place(&mut net, "Ready", 1)?;
    place(&mut net, "Produced", 0)?;
    net.add_place(Place::new("Buffer").with_capacity(capacity))?;
    place(&mut net, "Waiting", 1)?;
    place(&mut net, "Consuming", 0)?;
    step(&mut net, "Produce", &["Ready"], &["Produced"])?;
    step(&mut net, "Deposit", &["Produced"], &["Ready", "Buffer"])?;
    step(&mut net, "Take", &["Waiting", "Buffer"], &["Consuming"])?;
    step(&mut net, "Consume", &["Consuming"], &["Waiting"])?;
    Ok(net)
}

/// Dining philosophers picking up the left fork, then the right one. The
/// net deadlocks once every philosopher holds a left fork. Fewer than two
/// philosophers are rounded up to two.
pub fn philosophers(n: usize) -> Result<Net, NetError> {
    let n = n.max(2);
    let mut net = black_net()?;
    for i in 0..n {
        place(&mut net, &format!("Fork{i}"), 1)?;
    }
    for i in 0..n {
        let left = format!("Fork{i}");
        let right = format!("Fork{}", (i + 1) % n);
        let thinking = format!("Thinking{i}");
        let holding = format!("HasLeft{i}");
        let eating = format!("Eating{i}");
        place(&mut net, &thinking, 1)?;
        place(&mut net, &holding, 0)?;
        place(&mut net, &eating, 0)?;
        let (left, right) = (left.as_str(), right.as_str());
        let (thinking, holding, eating) = (thinking.as_str(), holding.as_str(), eating.as_str());
        step(&mut net, &format!("TakeLeft{i}"), &[thinking, left], &[holding])?;
        step(&mut net, &format!("TakeRight{i}"), &[holding, right], &[eating])?;
        step(&mut net, &format!("Release{i}"), &[eating], &[thinking, left, right])?;
    }
    Ok(net)
}

/// Two colours moved in bulk through a bounded buffer. `Move` carries one
/// red token and every blue one, `Drain` empties the buffer, and `Finish`
/// marks `Done`, which inhibits further moves.
pub fn colored_buffer() -> Result<Net, NetError> {
    let mut net = Net::empty();
    net.add_token_kind(TokenKind::new("red", Color::RED))?;
    net.add_token_kind(TokenKind::new("blue", Color::BLUE))?;
    net.add_place(Place::new("In").at(0, 0))?;
    net.add_place(Place::new("Buffer").with_capacity(4).at(100, 0))?;
    net.add_place(Place::new("Out").at(200, 0))?;
    net.add_place(Place::new("Done").with_capacity(1).at(300, 0))?;
    net.set_count("In", "red", 2)?;
    net.set_count("In", "blue", 3)?;

    net.add_transition(Transition::new("Move").at(50, 0))?;
    net.add_transition(Transition::new("Drain").at(150, 0))?;
    net.add_transition(Transition::new("Finish").at(250, 0))?;

    net.add_arc(
        Arc::input("In", "Move")
            .with_weight("red", 1)
            .with_expr("blue", WeightExpr::count("blue")),
    )?;
    net.add_arc(
        Arc::output("Move", "Buffer")
            .with_weight("red", 1)
            .with_expr("blue", WeightExpr::count_at("In", "blue")),
    )?;
    net.add_arc(Arc::inhibitor("Done", "Move").with_weight("red", 1))?;

    let at_least_one_red = WeightExpr::binary(
        BinOp::Max,
        WeightExpr::count("red"),
        WeightExpr::Literal(1),
    );
    net.add_arc(
        Arc::input("Buffer", "Drain")
            .with_expr("red", at_least_one_red)
            .with_expr("blue", WeightExpr::count("blue")),
    )?;
    net.add_arc(
        Arc::output("Drain", "Out")
            .with_expr("red", WeightExpr::count_at("Buffer", "red"))
            .with_expr("blue", WeightExpr::count_at("Buffer", "blue")),
    )?;

    net.add_arc(Arc::input("Out", "Finish").with_weight("red", 2))?;
    net.add_arc(Arc::output("Finish", "Done").with_weight("red", 1))?;
    Ok(net)
}
