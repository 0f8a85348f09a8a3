use anyhow::Result;
use colored::*;
use serde_json::json;
use std::time::{Duration, Instant};

use crate::output::{print_event, TestResult};
use crate::ws_client::Connection;

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);
const SILENCE_WINDOW: Duration = Duration::from_millis(500);

/// Both users register; each must see the other's join and the full member list.
pub async fn test_join(
    conn1: &mut Connection,
    name1: &str,
    conn2: &mut Connection,
    name2: &str,
) -> Result<TestResult> {
    let start = Instant::now();
    println!("\n{}", "=== TEST: Join ===".bright_cyan().bold());

    println!("{} {} setting name to {}...", "→".blue(), conn1.user_label, name1);
    conn1
        .send_json(&json!({"action": "setName", "name": name1}))
        .await?;
    let joined = conn1.wait_for_event("systemMessage", EVENT_TIMEOUT).await?;
    print_event(&conn1.user_label, &joined);

    println!("{} {} setting name to {}...", "→".blue(), conn2.user_label, name2);
    conn2
        .send_json(&json!({"action": "setName", "name": name2}))
        .await?;

    for conn in [conn1, conn2] {
        let members = match conn.wait_for_event("members", EVENT_TIMEOUT).await {
            Ok(event) => event,
            Err(e) => {
                return Ok(TestResult::fail("join", format!("{e}"), start.elapsed()));
            }
        };
        print_event(&conn.user_label, &members);

        let names: Vec<&str> = members.data["members"]
            .as_array()
            .map(|names| names.iter().filter_map(|name| name.as_str()).collect())
            .unwrap_or_default();
        if !names.contains(&name1) || !names.contains(&name2) {
            return Ok(TestResult::fail(
                "join",
                format!("{} saw members {:?}", conn.user_label, names),
                start.elapsed(),
            ));
        }

        let expected = format!("{name2} has joined the chat");
        let joined = conn.wait_for_event("systemMessage", EVENT_TIMEOUT).await?;
        if joined.data["systemMessage"] != expected {
            return Ok(TestResult::fail(
                "join",
                format!("expected {:?}, got {}", expected, joined.data),
                start.elapsed(),
            ));
        }
    }

    println!("{} Both users joined", "✓".green());
    Ok(TestResult::pass("join", start.elapsed()))
}

/// A public message from user 1 reaches both users.
pub async fn test_public_message(
    conn1: &mut Connection,
    name1: &str,
    conn2: &mut Connection,
) -> Result<TestResult> {
    let start = Instant::now();
    println!("\n{}", "=== TEST: Public Message ===".bright_cyan().bold());

    conn1.drain();
    conn2.drain();
    conn1
        .send_json(&json!({"action": "sendPublic", "message": "hello everyone"}))
        .await?;

    let expected = format!("{name1}: hello everyone");
    for conn in [conn1, conn2] {
        match conn.wait_for_event("publicMessage", EVENT_TIMEOUT).await {
            Ok(event) if event.data["publicMessage"] == expected => {
                print_event(&conn.user_label, &event);
            }
            Ok(event) => {
                return Ok(TestResult::fail(
                    "public_message",
                    format!("expected {:?}, got {}", expected, event.data),
                    start.elapsed(),
                ));
            }
            Err(e) => {
                println!("{} {}", "✗".red(), e);
                return Ok(TestResult::fail(
                    "public_message",
                    format!("{}: {}", conn.user_label, e),
                    start.elapsed(),
                ));
            }
        }
    }

    println!("{} Public message delivered to both users", "✓".green());
    Ok(TestResult::pass("public_message", start.elapsed()))
}

/// A private message from user 1 reaches user 2 only.
pub async fn test_private_message(
    conn1: &mut Connection,
    name1: &str,
    conn2: &mut Connection,
    name2: &str,
) -> Result<TestResult> {
    let start = Instant::now();
    println!("\n{}", "=== TEST: Private Message ===".bright_cyan().bold());

    conn1.drain();
    conn2.drain();
    conn1
        .send_json(&json!({"action": "sendPrivate", "to": name2, "message": "psst"}))
        .await?;

    let expected = format!("{name1}: psst");
    match conn2.wait_for_event("privateMessage", EVENT_TIMEOUT).await {
        Ok(event) if event.data["privateMessage"] == expected => {
            print_event(&conn2.user_label, &event);
        }
        Ok(event) => {
            return Ok(TestResult::fail(
                "private_message",
                format!("expected {:?}, got {}", expected, event.data),
                start.elapsed(),
            ));
        }
        Err(e) => {
            return Ok(TestResult::fail(
                "private_message",
                format!("{}: {}", conn2.user_label, e),
                start.elapsed(),
            ));
        }
    }

    if let Some(leaked) = conn1.expect_silence(SILENCE_WINDOW).await {
        return Ok(TestResult::fail(
            "private_message",
            format!("sender unexpectedly received {}", leaked.data),
            start.elapsed(),
        ));
    }

    println!("{} Private message delivered to recipient only", "✓".green());
    Ok(TestResult::pass("private_message", start.elapsed()))
}

/// A body that is not JSON earns the sender an error event.
pub async fn test_malformed_message(conn1: &mut Connection) -> Result<TestResult> {
    let start = Instant::now();
    println!("\n{}", "=== TEST: Malformed Message ===".bright_cyan().bold());

    conn1.drain();
    conn1.send_raw("this is not json").await?;

    match conn1.wait_for_event("error", EVENT_TIMEOUT).await {
        Ok(event) => {
            print_event(&conn1.user_label, &event);
            println!("{} Error event received", "✓".green());
            Ok(TestResult::pass("malformed_message", start.elapsed()))
        }
        Err(e) => Ok(TestResult::fail(
            "malformed_message",
            format!("{e}"),
            start.elapsed(),
        )),
    }
}

/// User 1 leaves; user 2 sees the departure and the shrunken member list.
pub async fn test_disconnect(
    conn1: Connection,
    name1: &str,
    conn2: &mut Connection,
) -> Result<TestResult> {
    let start = Instant::now();
    println!("\n{}", "=== TEST: Disconnect ===".bright_cyan().bold());

    conn2.drain();
    println!("{} {} disconnecting...", "→".blue(), conn1.user_label);
    conn1.close().await?;

    let expected = format!("{name1} has left the chat");
    let left = match conn2.wait_for_event("systemMessage", EVENT_TIMEOUT).await {
        Ok(event) => event,
        Err(e) => return Ok(TestResult::fail("disconnect", format!("{e}"), start.elapsed())),
    };
    print_event(&conn2.user_label, &left);
    if left.data["systemMessage"] != expected {
        return Ok(TestResult::fail(
            "disconnect",
            format!("expected {:?}, got {}", expected, left.data),
            start.elapsed(),
        ));
    }

    let members = conn2.wait_for_event("members", EVENT_TIMEOUT).await?;
    print_event(&conn2.user_label, &members);
    let still_listed = members.data["members"]
        .as_array()
        .is_some_and(|names| names.iter().any(|name| name == name1));
    if still_listed {
        return Ok(TestResult::fail(
            "disconnect",
            format!("{name1} still listed in {}", members.data),
            start.elapsed(),
        ));
    }

    println!("{} Departure announced", "✓".green());
    Ok(TestResult::pass("disconnect", start.elapsed()))
}
