//! End-to-end tests: build a tree, evaluate it with captured output, check
//! values, bytes and failures.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use reef_syntax::ast::{Compound, Form, Pipeline, Redir, RedirMode};
use reef_syntax::{Source, Span};

use crate::error::Error;
use crate::interfaces::{JobEvent, JobNotifier};
use crate::interp::Interp;
use crate::jobs::JobState;
use crate::testutil::{block, chunk, cmd, form, lambda, q, run, run_on, v, w};
use crate::value::Value;

fn strs(texts: &[&str]) -> Vec<Value> {
    texts.iter().map(|t| Value::Str((*t).to_string())).collect()
}

fn list(items: &[&str]) -> Compound {
    Compound::list(items.iter().map(|t| w(t)).collect(), Span::empty())
}

#[tokio::test]
async fn put_streams_its_arguments() {
    let c = chunk(vec![cmd("put", &[w("lorem"), w("ipsum")])]);
    let out = run(&c).await;
    out.result.unwrap();
    assert_eq!(out.values, strs(&["lorem", "ipsum"]));
    assert!(out.bytes.is_empty());
}

#[tokio::test]
async fn echo_writes_bytes_not_values() {
    let c = chunk(vec![cmd("echo", &[w("hello"), w("world")])]);
    let out = run(&c).await;
    out.result.unwrap();
    assert!(out.values.is_empty());
    assert_eq!(out.bytes, b"hello world\n");
}

#[tokio::test]
async fn echo_takes_a_separator_option() {
    let c = chunk(vec![Pipeline::new(vec![Form::new(w("echo"))
        .opt("sep", q(","))
        .arg(w("a"))
        .arg(w("b"))])]);
    let out = run(&c).await;
    out.result.unwrap();
    assert_eq!(out.bytes, b"a,b\n");
}

#[tokio::test]
async fn var_declares_and_set_mutates() {
    let c = chunk(vec![
        cmd("var", &[w("x"), w("="), w("first")]),
        cmd("set", &[w("x"), w("="), w("second")]),
        cmd("put", &[v("x")]),
    ]);
    let out = run(&c).await;
    out.result.unwrap();
    assert_eq!(out.values, strs(&["second"]));
}

#[tokio::test]
async fn set_creates_a_missing_local() {
    let c = chunk(vec![
        cmd("set", &[w("y"), w("="), w("made")]),
        cmd("put", &[v("y")]),
    ]);
    let out = run(&c).await;
    out.result.unwrap();
    assert_eq!(out.values, strs(&["made"]));
}

#[tokio::test]
async fn deleted_variables_are_gone() {
    let c = chunk(vec![
        cmd("var", &[w("x"), w("="), w("a")]),
        cmd("del", &[w("x")]),
        cmd("put", &[v("x")]),
    ]);
    let out = run(&c).await;
    let err = out.result.unwrap_err();
    assert!(matches!(err.reason(), Error::VariableNotFound(name) if name == "x"));
}

#[tokio::test]
async fn builtin_variables_are_read_only() {
    let c = chunk(vec![cmd("set", &[w("builtin:true"), w("="), w("x")])]);
    let out = run(&c).await;
    assert!(matches!(
        out.result.unwrap_err().reason(),
        Error::SetReadOnly
    ));
}

#[tokio::test]
async fn pipelines_carry_values_in_order() {
    let c = chunk(vec![Pipeline::new(vec![
        form("range", &[w("3")]),
        form("each", &[lambda(&["x"], vec![cmd("put", &[v("x")])])]),
    ])]);
    let out = run(&c).await;
    out.result.unwrap();
    assert_eq!(
        out.values,
        vec![Value::Int(0), Value::Int(1), Value::Int(2)]
    );
}

#[tokio::test]
async fn a_stage_ignoring_its_input_does_not_deadlock() {
    let c = chunk(vec![Pipeline::new(vec![
        form("range", &[w("100")]),
        form("put", &[w("done")]),
    ])]);
    let out = tokio::time::timeout(Duration::from_secs(5), run(&c))
        .await
        .expect("pipeline should finish");
    out.result.unwrap();
    assert_eq!(out.values, strs(&["done"]));
}

#[tokio::test]
async fn large_byte_writes_flow_into_a_value_reader() {
    // Bigger than an OS pipe buffer, so the producer cannot finish its write
    // until the consumer starts draining bytes.
    let big = "x".repeat(256 * 1024);
    let c = chunk(vec![Pipeline::new(vec![
        form("echo", &[q(&big)]),
        form("count", &[]),
    ])]);
    let out = tokio::time::timeout(Duration::from_secs(5), run(&c))
        .await
        .expect("pipeline should finish");
    out.result.unwrap();
    assert_eq!(out.values, vec![Value::Int(1)]);
}

#[tokio::test]
async fn redirections_round_trip_through_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.txt");
    let path = path.to_str().unwrap();

    let c = chunk(vec![
        Pipeline::new(vec![
            form("echo", &[w("stored")]).redir(Redir::new(RedirMode::Write, q(path)))
        ]),
        Pipeline::new(vec![
            form("slurp", &[]).redir(Redir::new(RedirMode::Read, q(path)))
        ]),
    ]);
    let out = run(&c).await;
    out.result.unwrap();
    assert_eq!(out.values, strs(&["stored\n"]));
}

#[tokio::test]
async fn a_repeated_redirection_leaves_the_last_target_active() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.txt");
    let second = dir.path().join("second.txt");

    let c = chunk(vec![Pipeline::new(vec![form("echo", &[w("picked")])
        .redir(Redir::new(RedirMode::Write, q(first.to_str().unwrap())))
        .redir(Redir::new(RedirMode::Write, q(second.to_str().unwrap())))])]);
    let out = run(&c).await;
    out.result.unwrap();
    assert_eq!(std::fs::read_to_string(&first).unwrap(), "");
    assert_eq!(std::fs::read_to_string(&second).unwrap(), "picked\n");
}

#[tokio::test]
async fn absurd_redirection_destinations_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.txt");

    let c = chunk(vec![Pipeline::new(vec![form("echo", &[w("x")]).redir(
        Redir::new(RedirMode::Write, q(path.to_str().unwrap())).with_dest(w("999999999")),
    )])]);
    let out = run(&c).await;
    assert!(matches!(
        out.result.unwrap_err().reason(),
        Error::InvalidFd(fd) if fd == "999999999"
    ));
}

#[tokio::test]
async fn values_written_to_a_plain_file_port_fail() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.txt");
    let path = path.to_str().unwrap();

    let c = chunk(vec![Pipeline::new(vec![
        form("put", &[w("x")]).redir(Redir::new(RedirMode::Write, q(path)))
    ])]);
    let out = run(&c).await;
    assert!(matches!(
        out.result.unwrap_err().reason(),
        Error::NoValueOutput
    ));
}

#[tokio::test]
async fn closures_in_a_loop_capture_distinct_cells() {
    // Each iteration declares its own `y`; the closures hold on to the cell
    // from their iteration, not the loop's last value.
    let c = chunk(vec![
        cmd("var", &[w("f1")]),
        cmd("var", &[w("f2")]),
        cmd(
            "for",
            &[
                w("x"),
                list(&["1", "2"]),
                block(vec![
                    cmd("var", &[w("y"), w("="), v("x")]),
                    cmd("fn", &[w("g"), lambda(&[], vec![cmd("put", &[v("y")])])]),
                    cmd("set", &[w("f2"), w("="), v("f1")]),
                    cmd("set", &[w("f1"), w("="), v("g~")]),
                ]),
            ],
        ),
        Pipeline::new(vec![Form::new(v("f2"))]),
        Pipeline::new(vec![Form::new(v("f1"))]),
    ]);
    let out = run(&c).await;
    out.result.unwrap();
    assert_eq!(out.values, strs(&["1", "2"]));
}

#[tokio::test]
async fn closures_share_cells_with_the_defining_scope() {
    let c = chunk(vec![
        cmd("var", &[w("n"), w("="), w("before")]),
        cmd("fn", &[w("bump"), lambda(&[], vec![
            cmd("set", &[w("n"), w("="), w("after")]),
        ])]),
        cmd("bump", &[]),
        cmd("put", &[v("n")]),
    ]);
    let out = run(&c).await;
    out.result.unwrap();
    assert_eq!(out.values, strs(&["after"]));
}

#[tokio::test]
async fn closures_see_later_writes_from_the_defining_scope() {
    let c = chunk(vec![
        cmd("var", &[w("n"), w("="), w("before")]),
        cmd("fn", &[w("get"), lambda(&[], vec![cmd("put", &[v("n")])])]),
        cmd("set", &[w("n"), w("="), w("after")]),
        cmd("get", &[]),
    ]);
    let out = run(&c).await;
    out.result.unwrap();
    assert_eq!(out.values, strs(&["after"]));
}

#[tokio::test]
async fn fn_bodies_absorb_return() {
    let c = chunk(vec![
        cmd("fn", &[w("f"), lambda(&[], vec![
            cmd("put", &[w("a")]),
            cmd("return", &[]),
            cmd("put", &[w("b")]),
        ])]),
        cmd("f", &[]),
    ]);
    let out = run(&c).await;
    out.result.unwrap();
    assert_eq!(out.values, strs(&["a"]));
}

#[tokio::test]
async fn return_outside_a_function_surfaces() {
    let c = chunk(vec![cmd("return", &[])]);
    let out = run(&c).await;
    assert!(matches!(
        out.result.unwrap_err().reason(),
        Error::Flow(crate::error::Flow::Return)
    ));
}

#[tokio::test]
async fn break_terminates_a_loop() {
    let c = chunk(vec![cmd(
        "for",
        &[
            w("x"),
            list(&["a", "b", "c"]),
            block(vec![cmd("put", &[v("x")]), cmd("break", &[])]),
        ],
    )]);
    let out = run(&c).await;
    out.result.unwrap();
    assert_eq!(out.values, strs(&["a"]));
}

#[tokio::test]
async fn continue_skips_the_rest_of_an_iteration() {
    let c = chunk(vec![cmd(
        "for",
        &[
            w("x"),
            list(&["a", "b"]),
            block(vec![cmd("continue", &[]), cmd("put", &[v("x")])]),
        ],
    )]);
    let out = run(&c).await;
    out.result.unwrap();
    assert!(out.values.is_empty());
}

#[tokio::test]
async fn while_loops_until_the_condition_fails() {
    let c = chunk(vec![
        cmd("while", &[v("false"), block(vec![cmd("put", &[w("never")])])]),
        cmd("while", &[v("true"), block(vec![cmd("break", &[])])]),
        cmd("put", &[w("done")]),
    ]);
    let out = tokio::time::timeout(Duration::from_secs(5), run(&c))
        .await
        .expect("loops should terminate");
    out.result.unwrap();
    assert_eq!(out.values, strs(&["done"]));
}

#[tokio::test]
async fn if_picks_the_first_true_branch() {
    let c = chunk(vec![cmd(
        "if",
        &[
            v("false"),
            block(vec![cmd("put", &[w("no")])]),
            w("elif"),
            v("true"),
            block(vec![cmd("put", &[w("yes")])]),
            w("else"),
            block(vec![cmd("put", &[w("fallback")])]),
        ],
    )]);
    let out = run(&c).await;
    out.result.unwrap();
    assert_eq!(out.values, strs(&["yes"]));
}

#[tokio::test]
async fn and_or_short_circuit() {
    let c = chunk(vec![
        cmd("and", &[w("a"), v("false"), w("b")]),
        cmd("or", &[v("false"), w("x")]),
        cmd("and", &[]),
    ]);
    let out = run(&c).await;
    out.result.unwrap();
    assert_eq!(
        out.values,
        vec![
            Value::Bool(false),
            Value::Str("x".to_string()),
            Value::Bool(true),
        ]
    );
}

#[tokio::test]
async fn arithmetic_stays_integral_where_it_can() {
    let c = chunk(vec![
        cmd("+", &[w("1"), w("2"), w("3")]),
        cmd("-", &[w("5")]),
        cmd("*", &[w("2"), w("3"), w("4")]),
        cmd("+", &[w("1.5"), w("1")]),
    ]);
    let out = run(&c).await;
    out.result.unwrap();
    assert_eq!(
        out.values,
        vec![
            Value::Int(6),
            Value::Int(-5),
            Value::Int(24),
            Value::Float(2.5),
        ]
    );
}

#[tokio::test]
async fn count_and_conj_work_on_lists() {
    let c = chunk(vec![
        cmd("count", &[list(&["a", "b", "c"])]),
        cmd("conj", &[list(&["a"]), w("b")]),
    ]);
    let out = run(&c).await;
    out.result.unwrap();
    assert_eq!(out.values.len(), 2);
    assert_eq!(out.values[0], Value::Int(3));
    assert_eq!(
        out.values[1],
        strs(&["a", "b"]).into_iter().collect::<Value>()
    );
}

#[tokio::test]
async fn indexing_supports_negative_indices() {
    let c = chunk(vec![
        cmd("var", &[w("xs"), w("="), list(&["a", "b", "c"])]),
        cmd(
            "put",
            &[
                Compound::indexed_var("xs", vec![w("0")], Span::empty()),
                Compound::indexed_var("xs", vec![w("-1")], Span::empty()),
            ],
        ),
    ]);
    let out = run(&c).await;
    out.result.unwrap();
    assert_eq!(out.values, strs(&["a", "c"]));
}

#[tokio::test]
async fn fail_raises_with_a_traceback() {
    let c = chunk(vec![cmd("fail", &[w("boom")])]);
    let out = run(&c).await;
    let err = out.result.unwrap_err();
    assert_eq!(err.to_string(), "boom");
    assert!(matches!(err.reason(), Error::Failed(_)));
    assert!(err.traceback().is_some());
    assert!(err.show().starts_with("error: boom"));
}

#[tokio::test]
async fn one_failing_stage_propagates_as_itself() {
    let c = chunk(vec![Pipeline::new(vec![
        form("put", &[w("x")]),
        form("fail", &[w("late")]),
    ])]);
    let out = run(&c).await;
    let err = out.result.unwrap_err();
    assert!(matches!(err.reason(), Error::Failed(msg) if msg == "late"));
}

#[tokio::test]
async fn several_failing_stages_compose() {
    let c = chunk(vec![Pipeline::new(vec![
        form("fail", &[w("a")]),
        form("fail", &[w("b")]),
    ])]);
    let out = run(&c).await;
    let err = out.result.unwrap_err();
    match err.reason() {
        Error::Pipeline(pe) => {
            assert_eq!(pe.to_string(), "(a | b)");
            assert_eq!(pe.failures().count(), 2);
        }
        other => panic!("expected a pipeline error, got {other}"),
    }
}

#[tokio::test]
async fn wrong_closure_arity_is_reported() {
    let c = chunk(vec![
        cmd("var", &[w("f"), w("="), lambda(&["x"], vec![cmd("put", &[v("x")])])]),
        Pipeline::new(vec![Form::new(v("f")).arg(w("a")).arg(w("b"))]),
    ]);
    let out = run(&c).await;
    let err = out.result.unwrap_err();
    assert_eq!(
        err.to_string(),
        "arity mismatch: arguments must be 1 value, but is 2 values"
    );
}

#[tokio::test]
async fn unknown_options_are_rejected() {
    let c = chunk(vec![Pipeline::new(vec![
        Form::new(w("put")).opt("bogus", w("1")).arg(w("x"))
    ])]);
    let out = run(&c).await;
    assert!(matches!(
        out.result.unwrap_err().reason(),
        Error::UnsupportedOption(name) if name == "bogus"
    ));
}

#[tokio::test]
async fn unknown_commands_fail_to_resolve() {
    let c = chunk(vec![cmd("definitely-not-installed-anywhere", &[])]);
    let out = run(&c).await;
    assert!(matches!(
        out.result.unwrap_err().reason(),
        Error::CommandNotFound(name) if name == "definitely-not-installed-anywhere"
    ));
}

#[cfg(unix)]
mod external {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::exception::ExitReason;

    #[tokio::test]
    async fn captures_child_output() {
        let c = chunk(vec![cmd("/bin/sh", &[w("-c"), q("printf external")])]);
        let out = run(&c).await;
        out.result.unwrap();
        assert_eq!(out.bytes, b"external");
    }

    #[tokio::test]
    async fn nonzero_exit_becomes_an_error() {
        let c = chunk(vec![cmd("/bin/sh", &[w("-c"), q("exit 3")])]);
        let out = run(&c).await;
        match out.result.unwrap_err().reason() {
            Error::ExternalCmd(exit) => {
                assert_eq!(exit.cmd_name, "/bin/sh");
                assert_eq!(exit.reason, ExitReason::Exited(3));
            }
            other => panic!("expected an external command error, got {other}"),
        }
    }

    #[tokio::test]
    async fn signals_are_reported_by_name() {
        let c = chunk(vec![cmd("/bin/sh", &[w("-c"), q("kill -TERM $$")])]);
        let out = run(&c).await;
        match out.result.unwrap_err().reason() {
            Error::ExternalCmd(exit) => {
                assert_eq!(
                    exit.reason,
                    ExitReason::Signaled {
                        signal: "SIGTERM".to_string(),
                        core_dumped: false,
                    }
                );
            }
            other => panic!("expected an external command error, got {other}"),
        }
    }

    #[tokio::test]
    async fn pipes_bytes_between_stages() {
        let c = chunk(vec![Pipeline::new(vec![
            form("/bin/sh", &[w("-c"), q("printf 'a\\nb\\n'")]),
            form("each", &[lambda(&["line"], vec![cmd("put", &[v("line")])])]),
        ])]);
        let out = run(&c).await;
        out.result.unwrap();
        assert_eq!(out.values, strs(&["a", "b"]));
    }

    #[tokio::test]
    async fn a_stage_outliving_the_interrupt_grace_is_given_up_on() {
        // An external child does not watch the interrupt flag, so it is
        // still running when the grace deadline passes.
        let interp = Interp::new();
        let c = chunk(vec![cmd("/bin/sh", &[w("-c"), q("sleep 1")])]);
        let handle = {
            let interp = interp.clone();
            tokio::spawn(async move {
                let src = Source::synthetic("[test: overstay]");
                interp.eval_capture(&c, src).await.unwrap()
            })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        interp.interrupt();

        let out = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("the join should give up within the grace period")
            .unwrap();
        assert!(matches!(
            out.result.unwrap_err().reason(),
            Error::StillRunning
        ));
    }
}

struct ChannelNotifier {
    events: tokio::sync::mpsc::UnboundedSender<JobEvent>,
    active: std::sync::atomic::AtomicBool,
}

impl ChannelNotifier {
    fn new(events: tokio::sync::mpsc::UnboundedSender<JobEvent>) -> Self {
        Self {
            events,
            active: std::sync::atomic::AtomicBool::new(true),
        }
    }
}

impl JobNotifier for ChannelNotifier {
    fn notify(&self, event: JobEvent) {
        let _ = self.events.send(event);
    }

    fn is_active(&self) -> bool {
        self.active.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn set_active(&self, active: bool) {
        self.active.store(active, std::sync::atomic::Ordering::SeqCst);
    }
}

#[tokio::test]
async fn background_pipelines_report_to_the_notifier() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let interp = Interp::new();
    interp.set_job_notifier(Arc::new(ChannelNotifier::new(tx)));

    let c = chunk(vec![
        Pipeline::new(vec![form("put", &[w("bg")])]).into_background()
    ]);
    let out = run_on(&interp, &c).await;
    out.result.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("the job should finish")
        .expect("the notifier should fire");
    event.result.unwrap();
    assert_eq!(event.description, "put bg &");
    let job = interp.jobs().job(event.job_id).unwrap();
    assert_eq!(job.state, JobState::Done);
    assert_eq!(interp.jobs().running_background(), 0);
}

#[tokio::test]
async fn failed_background_pipelines_report_the_exception() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let interp = Interp::new();
    interp.set_job_notifier(Arc::new(ChannelNotifier::new(tx)));

    let c = chunk(vec![
        Pipeline::new(vec![form("fail", &[w("bg-broke")])]).into_background()
    ]);
    run_on(&interp, &c).await.result.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("the job should finish")
        .expect("the notifier should fire");
    let err = event.result.unwrap_err();
    assert!(matches!(err.reason(), Error::Failed(msg) if msg == "bg-broke"));
}

#[tokio::test]
async fn an_inactive_notifier_receives_nothing() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let interp = Interp::new();
    let notifier = Arc::new(ChannelNotifier::new(tx));
    interp.set_job_notifier(notifier.clone());
    notifier.set_active(false);

    let c = chunk(vec![
        Pipeline::new(vec![form("put", &[w("quiet")])]).into_background()
    ]);
    run_on(&interp, &c).await.result.unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while interp.jobs().running_background() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("the job should finish");
    assert!(rx.try_recv().is_err());

    notifier.set_active(true);
    let c = chunk(vec![
        Pipeline::new(vec![form("put", &[w("loud")])]).into_background()
    ]);
    run_on(&interp, &c).await.result.unwrap();
    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("the job should finish")
        .expect("the notifier should fire");
    assert_eq!(event.description, "put loud &");
}

#[tokio::test]
async fn a_pending_interrupt_stops_evaluation() {
    let interp = Interp::new();
    interp.interrupt();

    let c = chunk(vec![cmd("put", &[w("x")])]);
    let out = run_on(&interp, &c).await;
    assert!(matches!(
        out.result.unwrap_err().reason(),
        Error::Interrupted
    ));

    interp.reset_interrupts();
    let out = run_on(&interp, &c).await;
    out.result.unwrap();
    assert_eq!(out.values, strs(&["x"]));
}

#[tokio::test]
async fn sleep_wakes_on_interrupt() {
    let interp = Interp::new();
    let c = chunk(vec![cmd("sleep", &[w("30")])]);
    let handle = {
        let interp = interp.clone();
        tokio::spawn(async move {
            let src = Source::synthetic("[test: sleep]");
            interp.eval_capture(&c, src).await.unwrap()
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    interp.interrupt();

    let out = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("the sleep should be cut short")
        .unwrap();
    assert!(matches!(
        out.result.unwrap_err().reason(),
        Error::Interrupted
    ));
}

#[tokio::test]
async fn background_pipelines_ignore_foreground_interrupts() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let interp = Interp::new();
    interp.set_job_notifier(Arc::new(ChannelNotifier::new(tx)));

    // A background sleep outlives an interrupt aimed at the foreground.
    let c = chunk(vec![
        Pipeline::new(vec![form("sleep", &[w("0.2")])]).into_background()
    ]);
    run_on(&interp, &c).await.result.unwrap();
    interp.interrupt();

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("the job should finish")
        .expect("the notifier should fire");
    event.result.unwrap();
}

#[tokio::test]
async fn store_operations_fail_cleanly_when_unattached() {
    let interp = Interp::new();
    assert!(matches!(
        interp.store().map(|_| ()),
        Err(Error::StoreNotConnected)
    ));
}

#[tokio::test]
async fn concatenation_joins_parts_into_one_word() {
    use reef_syntax::ast::{Indexing, Primary, PrimaryKind};

    let parts = vec![
        Indexing::new(Primary {
            span: Span::empty(),
            kind: PrimaryKind::Bareword("pre-".to_string()),
        }),
        Indexing::new(Primary {
            span: Span::empty(),
            kind: PrimaryKind::Variable("x".to_string()),
        }),
    ];
    let compound = Compound {
        span: Span::empty(),
        parts,
    };
    let c = chunk(vec![
        cmd("var", &[w("x"), w("="), w("fix")]),
        cmd("put", &[compound]),
    ]);
    let out = run(&c).await;
    out.result.unwrap();
    assert_eq!(out.values, strs(&["pre-fix"]));
}
