//! Command surface tests over a live connection: SEND delivery, WHO, HELP,
//! diagnostics and QUIT.

mod common;

use common::*;

#[tokio::test]
async fn send_delivers_to_online_recipient() {
    let server = spawn_server().await;
    let mut alice = login(server.addr, "alice").await;
    let mut bobby = login(server.addr, "bobby").await;

    send_line(&mut bobby, "SEND alice hello").await;
    let text = read_until(&mut bobby, "OK: Message sent to alice.").await;
    assert!(!text.contains("ERROR"));

    let text = read_until(&mut alice, "bobby: hello").await;
    assert!(text.contains("] bobby: hello"));
}

#[tokio::test]
async fn send_to_unknown_recipient() {
    let server = spawn_server().await;
    let mut bobby = login(server.addr, "bobby").await;

    send_line(&mut bobby, "SEND carol hi").await;
    read_until(&mut bobby, "ERROR: User `carol` does not exist.").await;
}

#[tokio::test]
async fn send_to_offline_recipient() {
    let server = spawn_server().await;

    let mut alice = login(server.addr, "alice").await;
    send_line(&mut alice, "QUIT").await;
    read_until(&mut alice, "OK: Goodbye.").await;
    drop(alice);

    let mut bobby = login(server.addr, "bobby").await;
    send_line(&mut bobby, "SEND alice hi").await;
    read_until(&mut bobby, "ERROR: User `alice` is not online.").await;
}

#[tokio::test]
async fn who_lists_offline_users_too() {
    let server = spawn_server().await;

    let mut alice = login(server.addr, "alice").await;
    send_line(&mut alice, "QUIT").await;
    read_until(&mut alice, "OK: Goodbye.").await;
    drop(alice);

    let mut bobby = login(server.addr, "bobby").await;
    send_line(&mut bobby, "WHO").await;
    let text = read_until(&mut bobby, "#2 - ").await;
    assert!(text.contains("Online users:"));
    assert!(text.contains("#1 - alice - Last active: "));
    assert!(text.contains("#2 - bobby - Last active: "));
}

#[tokio::test]
async fn help_command_list_and_topics() {
    let server = spawn_server().await;
    let mut alice = login(server.addr, "alice").await;

    send_line(&mut alice, "HELP").await;
    let text = read_until(&mut alice, "TASKS - Display the current periodic tasks").await;
    assert!(text.contains("Available commands:"));
    assert!(text.contains("SEND <username> <message> - Send a message to a user"));

    send_line(&mut alice, "HELP ABOUT").await;
    let text = read_until(&mut alice, "server_name").await;
    assert!(text.contains("\"server_name\":\"LineBBS Server\""));
    assert!(text.contains("\"server_license\":\"GPL v3\""));

    send_line(&mut alice, "HELP CONTRIBUTING").await;
    read_until(&mut alice, "Contributions to this project are welcome.").await;

    send_line(&mut alice, "HELP DANCING").await;
    read_until(&mut alice, "ERROR: HELP topic not found.").await;
}

#[tokio::test]
async fn ticks_and_tasks_diagnostics() {
    let server = spawn_server().await;
    let mut alice = login(server.addr, "alice").await;

    send_line(&mut alice, "TICKS").await;
    read_until(&mut alice, "OK: Server ticks: ").await;

    send_line(&mut alice, "TASKS").await;
    let text = read_until(&mut alice, "checkpoint - Interval: 600, Last run: ").await;
    assert!(text.contains("Periodic tasks:"));
}

#[tokio::test]
async fn blank_line_is_a_noop() {
    let server = spawn_server().await;
    let mut alice = login(server.addr, "alice").await;

    send_line(&mut alice, "").await;
    send_line(&mut alice, "TICKS").await;
    let text = read_until(&mut alice, "OK: Server ticks: ").await;
    assert!(!text.contains("ERROR"));
}

#[tokio::test]
async fn unknown_command_keeps_session_open() {
    let server = spawn_server().await;
    let mut alice = login(server.addr, "alice").await;

    send_line(&mut alice, "FROBNICATE").await;
    read_until(&mut alice, "ERROR: Command was not understood. Type HELP for available commands.")
        .await;

    send_line(&mut alice, "TICKS").await;
    read_until(&mut alice, "OK: Server ticks: ").await;
}

#[tokio::test]
async fn quit_says_goodbye_and_closes() {
    let server = spawn_server().await;
    let mut alice = login(server.addr, "alice").await;

    send_line(&mut alice, "QUIT").await;
    let text = read_to_eof(&mut alice).await;
    assert!(text.contains("OK: Goodbye."));
}

#[tokio::test]
async fn malformed_send_ends_session_but_clears_the_connection() {
    let server = spawn_server().await;
    let mut alice = login(server.addr, "alice").await;

    // SEND with no recipient is a malformed line: the session ends without a
    // protocol reply.
    send_line(&mut alice, "SEND").await;
    let text = read_to_eof(&mut alice).await;
    assert!(!text.contains("ERROR:"), "got {:?}", text);

    // The dead session's handle was cleared, so the name is free again.
    let _again = login(server.addr, "alice").await;
}
