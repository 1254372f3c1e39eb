use std::fs;
use std::sync::mpsc;
use std::sync::Arc;

use llm_provider_mock::{ScriptedProvider, ScriptedTurn};
use prepf::client::{ChatClient, ChatClientOptions};
use prepf::grade::Grade;
use prepf::interview::{InterviewSession, InterviewState, SessionLimits};
use prepf::runtime::{AppEvent, EventLoop, RuntimeHost};
use prepf::tui::Presenter;

fn event_loop(
    provider: ScriptedProvider,
    resume: Option<std::path::PathBuf>,
) -> (EventLoop<Vec<u8>>, mpsc::Sender<AppEvent>, Arc<ScriptedProvider>) {
    let provider = Arc::new(provider);
    let client = ChatClient::new(
        Arc::clone(&provider) as Arc<dyn llm_provider::TurnProvider>,
        ChatClientOptions::default(),
    );
    let (tx, rx) = mpsc::channel();
    let host = RuntimeHost::new(client, tx.clone()).expect("chunk waiter starts");
    let session = InterviewSession::new(SessionLimits::default(), resume);
    let event_loop = EventLoop::new(session, host, rx, Presenter::new(Vec::new(), false));
    (event_loop, tx, provider)
}

#[test]
fn scripted_interview_runs_end_to_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let resume = dir.path().join("resume.md");
    fs::write(&resume, "  Rust engineer, 6 years  \n").expect("write resume");

    let (mut event_loop, tx, provider) = event_loop(
        ScriptedProvider::new(vec![
            ScriptedTurn::reply("What is a hash map? <NEXT>"),
            ScriptedTurn::reply("Thanks, that covers it. <ROAST>"),
        ]),
        Some(resume),
    );

    tx.send(AppEvent::Input("/skip".to_string())).expect("send");
    event_loop
        .run_until(|session| session.state() == &InterviewState::AwaitingAnswer)
        .expect("opening question");
    assert_eq!(event_loop.session().current_question(), "What is a hash map?");
    assert_eq!(event_loop.session().resume(), "Rust engineer, 6 years");

    tx.send(AppEvent::Input("an array of buckets".to_string()))
        .expect("send");
    event_loop
        .run_until(|session| session.report().is_some())
        .expect("graded");

    tx.send(AppEvent::Input("/quit".to_string())).expect("send");
    let (session, output) = event_loop.run().expect("loop exits");
    let output = String::from_utf8(output).expect("utf-8 output");

    let report = session.report().expect("report card");
    assert_eq!(report.grade, Grade::A);
    assert_eq!(report.feedback, "Thanks, that covers it.");
    assert!(session.should_exit());

    assert!(output.contains("Interviewer:\nWhat is a hash map?"));
    assert!(output.contains("Grade: A  ARCHITECT MATERIAL"));
    assert!(!output.contains("<NEXT>"));
    assert!(!output.contains("<ROAST>"));

    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].contents[0].text.contains("Rust engineer, 6 years"));
}

#[test]
fn closed_input_quits_and_cancels_the_active_turn() {
    let (mut event_loop, tx, _provider) =
        event_loop(ScriptedProvider::new(vec![ScriptedTurn::StallUntilCancelled]), None);

    tx.send(AppEvent::Input("/skip".to_string())).expect("send");
    event_loop
        .run_until(|session| session.active_turn_id().is_some())
        .expect("turn starts");

    tx.send(AppEvent::InputClosed).expect("send");
    let (session, _) = event_loop.run().expect("loop exits");

    assert!(session.should_exit());
    assert!(session.report().is_none());
}

#[test]
fn finished_reply_prints_a_trailing_angle_bracket() {
    let (mut event_loop, tx, _provider) = event_loop(
        ScriptedProvider::new(vec![ScriptedTurn::reply("Say when this holds: a <")]),
        None,
    );

    tx.send(AppEvent::Input("/skip".to_string())).expect("send");
    event_loop
        .run_until(|session| session.state() == &InterviewState::AwaitingAnswer)
        .expect("question arrives");
    assert_eq!(event_loop.session().current_question(), "Say when this holds: a <");

    tx.send(AppEvent::Input("/quit".to_string())).expect("send");
    let (_, output) = event_loop.run().expect("loop exits");
    let output = String::from_utf8(output).expect("utf-8 output");

    assert!(output.contains("Interviewer:\nSay when this holds: a <\n"));
}
