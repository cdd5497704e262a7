#![deny(warnings)]

use std::{
    fmt::Debug,
    task::Poll,
    time::Duration,
};

use rstest::rstest;

use common::log::debug;

use kernel::{
    Address,
    Error,
    Kernel,
    Outcome,
    Result,
    State,
    Suspend,
    SuspendReason,
    SuspendType,
};

mod log;

#[rstest]
#[timeout(Duration::from_secs(1))]
fn first_task_runs() {
    let mut kernel = Kernel::new();
    assert_eq!(kernel.current_task(), None);

    let a = kernel.create_task("a", 20);
    assert_eq!(kernel.current_task(), Some(a));
    assert_eq!(kernel.task_state(a), Ok(State::Running));

    let low = kernel.create_task("low", 30);
    assert_eq!(kernel.current_task(), Some(a));
    assert_eq!(kernel.task_state(low), Ok(State::Ready));

    let high = kernel.create_task("high", 10);
    assert_eq!(kernel.current_task(), Some(high));
    assert_eq!(kernel.task_state(a), Ok(State::Ready));
    assert_eq!(kernel.task_priority(high), Ok(10));

    assert_eq!(kernel.established_tasks(), 3);
    kernel.validate();

    debug!(task = %kernel.task(high).unwrap());
}

#[rstest]
#[timeout(Duration::from_secs(1))]
fn relinquish() {
    let mut kernel = Kernel::new();

    let a = kernel.create_task("a", 10);
    let b = kernel.create_task("b", 10);
    let c = kernel.create_task("c", 10);
    let low = kernel.create_task("low", 20);

    assert_eq!(kernel.current_task(), Some(a));
    assert_eq!(kernel.scheduler().ready().head(), Some(b));

    kernel.relinquish();
    assert_eq!(kernel.current_task(), Some(b));
    assert_eq!(kernel.task_state(a), Ok(State::Ready));
    assert_eq!(kernel.scheduler().ready().head(), Some(c));
    kernel.validate();

    kernel.relinquish();
    assert_eq!(kernel.current_task(), Some(c));
    assert_eq!(kernel.scheduler().ready().head(), Some(a));

    kernel.relinquish();
    assert_eq!(kernel.current_task(), Some(a));

    kernel.terminate_task(a).unwrap();
    kernel.terminate_task(b).unwrap();
    kernel.terminate_task(c).unwrap();
    assert_eq!(kernel.current_task(), Some(low));

    kernel.relinquish();
    assert_eq!(kernel.current_task(), Some(low));
    kernel.validate();
}

#[rstest]
#[timeout(Duration::from_secs(1))]
fn deferred_preemption() {
    let mut kernel = Kernel::new();

    let a = kernel.create_task("a", 20);
    let dispatches = kernel.scheduler().dispatches();

    kernel.schedule_lock();
    let b = kernel.create_task("b", 10);

    assert_eq!(kernel.current_task(), Some(a));
    assert_eq!(kernel.task_state(b), Ok(State::Ready));

    kernel.schedule_lock();
    kernel.schedule_unlock().unwrap();
    assert_eq!(kernel.current_task(), Some(a));
    assert_eq!(kernel.scheduler().dispatches(), dispatches);

    kernel.schedule_unlock().unwrap();
    assert_eq!(kernel.current_task(), Some(b));
    assert_eq!(kernel.task_state(a), Ok(State::Ready));
    assert_eq!(kernel.scheduler().dispatches(), dispatches + 1);

    assert_eq!(kernel.schedule_unlock(), Err(Error::InvalidOperation));
    kernel.validate();
}

#[rstest]
#[timeout(Duration::from_secs(1))]
fn suspend_requires_task_context() {
    let mut kernel = Kernel::new();

    let mailbox = kernel.create_mailbox("mailbox", SuspendType::Fifo);
    let pool = kernel
        .create_memory_pool("pool", Address::new(0x1000), 64, 8, SuspendType::Fifo)
        .unwrap();

    assert_eq!(
        kernel.receive_from_mailbox(mailbox, Suspend::Forever),
        Err(Error::InvalidSuspend),
    );

    kernel.create_task("task", 10);
    ready(kernel.allocate_memory(pool, 32, Suspend::NoSuspend));

    kernel.enter_interrupt();

    assert_eq!(
        kernel.receive_from_mailbox(mailbox, Suspend::Forever),
        Err(Error::InvalidSuspend),
    );
    assert_eq!(
        kernel.allocate_memory(pool, 8, Suspend::Timeout(5)),
        Err(Error::InvalidSuspend),
    );
    assert_eq!(
        kernel.allocate_memory(pool, 8, Suspend::NoSuspend),
        Err(Error::NoMemory),
    );
    assert_eq!(
        kernel.receive_from_mailbox(mailbox, Suspend::Timeout(0)),
        Err(Error::MailboxEmpty),
    );

    kernel.leave_interrupt().unwrap();
    assert_eq!(kernel.leave_interrupt(), Err(Error::InvalidOperation));

    assert_eq!(kernel.memory_pool_information(pool).map(|info| *info.tasks_waiting()), Ok(0));
    assert_eq!(kernel.mailbox_information(mailbox).map(|info| *info.tasks_waiting()), Ok(0));
    kernel.validate();
}

#[rstest]
#[timeout(Duration::from_secs(1))]
fn suspend_under_schedule_lock() {
    let mut kernel = Kernel::new();

    let mailbox = kernel.create_mailbox("mailbox", SuspendType::Fifo);
    let pool = kernel
        .create_memory_pool("pool", Address::new(0x1000), 64, 8, SuspendType::Fifo)
        .unwrap();

    let a = kernel.create_task("a", 10);
    let b = kernel.create_task("b", 20);
    ready(kernel.allocate_memory(pool, 32, Suspend::NoSuspend));
    assert_eq!(kernel.scheduler().ready().head(), Some(b));

    kernel.schedule_lock();

    assert_eq!(
        kernel.receive_from_mailbox(mailbox, Suspend::Forever),
        Err(Error::InvalidSuspend),
    );
    assert_eq!(
        kernel.allocate_memory(pool, 8, Suspend::Timeout(5)),
        Err(Error::InvalidSuspend),
    );
    assert_eq!(
        kernel.receive_from_mailbox(mailbox, Suspend::NoSuspend),
        Err(Error::MailboxEmpty),
    );

    assert_eq!(kernel.current_task(), Some(a));
    assert_eq!(kernel.task_state(a), Ok(State::Running));
    assert_eq!(kernel.scheduler().ready().head(), Some(b));

    kernel.schedule_unlock().unwrap();

    assert_eq!(kernel.memory_pool_information(pool).map(|info| *info.tasks_waiting()), Ok(0));
    assert_eq!(kernel.mailbox_information(mailbox).map(|info| *info.tasks_waiting()), Ok(0));

    assert_eq!(kernel.receive_from_mailbox(mailbox, Suspend::Forever), Ok(Poll::Pending));
    assert_eq!(kernel.task_state(a), Ok(State::Suspended(SuspendReason::Mailbox)));
    assert_eq!(kernel.current_task(), Some(b));
    assert!(kernel.scheduler().ready().is_empty());
    kernel.validate();
}

#[rstest]
#[timeout(Duration::from_secs(1))]
fn interrupt_defers_dispatch() {
    let mut kernel = Kernel::new();
    let mailbox = kernel.create_mailbox("mailbox", SuspendType::Fifo);
    let message = [1, 2, 3, 4];

    let receiver = kernel.create_task("receiver", 10);
    assert_eq!(kernel.receive_from_mailbox(mailbox, Suspend::Forever), Ok(Poll::Pending));
    assert_eq!(kernel.task_state(receiver), Ok(State::Suspended(SuspendReason::Mailbox)));
    assert_eq!(kernel.current_task(), None);

    let idle = kernel.create_task("idle", 20);
    assert_eq!(kernel.current_task(), Some(idle));

    kernel.enter_interrupt();
    assert_eq!(kernel.send_to_mailbox(mailbox, message, Suspend::NoSuspend), Ok(Poll::Ready(())));
    assert_eq!(kernel.current_task(), Some(idle));
    assert_eq!(kernel.task_state(receiver), Ok(State::Ready));
    kernel.validate();

    kernel.leave_interrupt().unwrap();
    assert_eq!(kernel.current_task(), Some(receiver));
    assert_eq!(kernel.resume_status(receiver), Ok(Poll::Ready(Outcome::Received(message))));
    assert_eq!(kernel.resume_status(receiver), Ok(Poll::Pending));
    kernel.validate();
}

#[rstest]
#[timeout(Duration::from_secs(1))]
fn timeout() {
    let mut kernel = Kernel::new();
    let mailbox = kernel.create_mailbox("mailbox", SuspendType::Priority);

    let receiver = kernel.create_task("receiver", 10);
    assert_eq!(kernel.receive_from_mailbox(mailbox, Suspend::Timeout(5)), Ok(Poll::Pending));

    let idle = kernel.create_task("idle", 20);

    kernel.tick(4);
    assert_eq!(kernel.ticks(), 4);
    assert_eq!(kernel.current_task(), Some(idle));
    assert_eq!(kernel.resume_status(receiver), Ok(Poll::Pending));
    kernel.validate();

    kernel.tick(1);
    assert_eq!(kernel.current_task(), Some(receiver));
    assert_eq!(kernel.resume_status(receiver), Err(Error::Timeout));
    assert_eq!(kernel.mailbox_information(mailbox).map(|info| *info.tasks_waiting()), Ok(0));
    kernel.validate();
}

#[rstest]
#[timeout(Duration::from_secs(1))]
fn terminate_and_delete() {
    let mut kernel = Kernel::new();
    let mailbox = kernel.create_mailbox("mailbox", SuspendType::Fifo);

    let waiter = kernel.create_task("waiter", 10);
    assert_eq!(kernel.receive_from_mailbox(mailbox, Suspend::Forever), Ok(Poll::Pending));

    let main = kernel.create_task("main", 20);
    assert_eq!(kernel.delete_task(main), Err(Error::InvalidOperation));

    kernel.terminate_task(waiter).unwrap();
    assert_eq!(kernel.task_state(waiter), Ok(State::Terminated));
    assert_eq!(kernel.resume_status(waiter), Err(Error::TaskTerminated));
    assert_eq!(kernel.mailbox_information(mailbox).map(|info| *info.tasks_waiting()), Ok(0));
    kernel.validate();

    assert_eq!(kernel.terminate_task(waiter), Ok(()));
    kernel.delete_task(waiter).unwrap();
    assert_eq!(kernel.task_state(waiter), Err(Error::InvalidTask));
    assert_eq!(kernel.terminate_task(waiter), Err(Error::InvalidTask));

    kernel.terminate_task(main).unwrap();
    assert_eq!(kernel.current_task(), None);
    kernel.delete_task(main).unwrap();
    assert_eq!(kernel.established_tasks(), 0);
    kernel.validate();
}

fn ready<T: Debug>(poll: Result<Poll<T>>) -> T {
    match poll {
        Ok(Poll::Ready(value)) => value,
        other => panic!("expected a completed call, got {other:?}"),
    }
}

#[ctor::ctor]
fn init() {
    log::init();
}
