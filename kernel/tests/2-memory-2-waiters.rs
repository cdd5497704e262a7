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
    PoolId,
    Result,
    State,
    Suspend,
    SuspendReason,
    SuspendType,
    TaskId,
};

mod log;

#[rstest]
#[timeout(Duration::from_secs(1))]
fn waiters_are_not_reordered() {
    let (mut kernel, pool, owner, [small, large]) = exhausted(SuspendType::Fifo);

    let a = kernel.create_task("a", 10);
    assert_eq!(kernel.current_task(), Some(a));
    assert_eq!(kernel.allocate_memory(pool, 200, Suspend::Forever), Ok(Poll::Pending));
    assert_eq!(kernel.task_state(a), Ok(State::Suspended(SuspendReason::Memory)));

    let b = kernel.create_task("b", 20);
    assert_eq!(kernel.current_task(), Some(b));
    assert_eq!(kernel.allocate_memory(pool, 50, Suspend::Forever), Ok(Poll::Pending));

    assert_eq!(kernel.current_task(), Some(owner));
    assert_eq!(waiting(&kernel, pool), 2);
    kernel.validate();

    kernel.deallocate_memory(small).unwrap();
    kernel.validate();

    assert_eq!(available(&kernel, pool), 60);
    assert_eq!(waiting(&kernel, pool), 2);
    assert_eq!(kernel.task_state(a), Ok(State::Suspended(SuspendReason::Memory)));
    assert_eq!(kernel.task_state(b), Ok(State::Suspended(SuspendReason::Memory)));
    assert_eq!(kernel.resume_status(b), Ok(Poll::Pending));
    assert_eq!(kernel.current_task(), Some(owner));

    kernel.schedule_lock();
    kernel.deallocate_memory(large).unwrap();

    assert_eq!(kernel.current_task(), Some(owner));
    assert_eq!(kernel.task_state(a), Ok(State::Ready));
    assert_eq!(kernel.task_state(b), Ok(State::Ready));
    assert_eq!(waiting(&kernel, pool), 0);

    kernel.schedule_unlock().unwrap();
    assert_eq!(kernel.current_task(), Some(a));
    kernel.validate();

    let Ok(Poll::Ready(Outcome::Allocated(for_a))) = kernel.resume_status(a) else {
        panic!("task a did not get its memory");
    };
    let Ok(Poll::Ready(Outcome::Allocated(for_b))) = kernel.resume_status(b) else {
        panic!("task b did not get its memory");
    };

    debug!(%for_a, %for_b);

    assert_eq!(available(&kernel, pool), 480 - (200 + 16) - (52 + 16));

    kernel.deallocate_memory(for_a).unwrap();
    kernel.deallocate_memory(for_b).unwrap();
    assert_eq!(available(&kernel, pool), 480);
    kernel.validate();
}

#[rstest]
#[case::fifo(SuspendType::Fifo, "low")]
#[case::priority(SuspendType::Priority, "high")]
#[timeout(Duration::from_secs(1))]
fn suspension_order(
    #[case] suspend_type: SuspendType,
    #[case] first: &str,
) {
    let (mut kernel, pool, _owner, [small, _]) = exhausted(suspend_type);

    let low = kernel.create_task("low", 20);
    assert_eq!(kernel.allocate_memory(pool, 60, Suspend::Forever), Ok(Poll::Pending));

    let high = kernel.create_task("high", 10);
    assert_eq!(kernel.allocate_memory(pool, 60, Suspend::Forever), Ok(Poll::Pending));

    let expected = if first == "low" { low } else { high };
    let other = if first == "low" { high } else { low };

    let info = kernel.memory_pool_information(pool).unwrap();
    assert_eq!(*info.tasks_waiting(), 2);
    assert_eq!(*info.first_task(), Some(expected));
    kernel.validate();

    kernel.deallocate_memory(small).unwrap();
    kernel.validate();

    assert_eq!(kernel.current_task(), Some(expected));
    assert_eq!(
        kernel.resume_status(expected),
        Ok(Poll::Ready(Outcome::Allocated(small))),
    );
    assert_eq!(kernel.resume_status(other), Ok(Poll::Pending));
    assert_eq!(kernel.memory_pool_information(pool).map(|info| *info.first_task()), Ok(Some(other)));
}

#[rstest]
#[timeout(Duration::from_secs(1))]
fn timeout() {
    let (mut kernel, pool, owner, [small, _]) = exhausted(SuspendType::Fifo);

    let a = kernel.create_task("a", 10);
    assert_eq!(kernel.allocate_memory(pool, 200, Suspend::Timeout(10)), Ok(Poll::Pending));

    let b = kernel.create_task("b", 20);
    assert_eq!(kernel.allocate_memory(pool, 40, Suspend::Timeout(20)), Ok(Poll::Pending));

    kernel.tick(9);
    assert_eq!(waiting(&kernel, pool), 2);
    assert_eq!(kernel.current_task(), Some(owner));

    kernel.tick(1);
    assert_eq!(waiting(&kernel, pool), 1);
    assert_eq!(kernel.current_task(), Some(a));
    assert_eq!(kernel.resume_status(a), Err(Error::Timeout));
    kernel.validate();

    kernel.terminate_task(a).unwrap();
    assert_eq!(kernel.current_task(), Some(owner));

    kernel.deallocate_memory(small).unwrap();
    assert_eq!(kernel.current_task(), Some(b));
    assert!(matches!(
        kernel.resume_status(b),
        Ok(Poll::Ready(Outcome::Allocated(_))),
    ));

    kernel.tick(100);
    assert_eq!(kernel.resume_status(b), Ok(Poll::Pending));
    kernel.validate();
}

#[rstest]
#[timeout(Duration::from_secs(1))]
fn delete_with_waiters() {
    let (mut kernel, pool, owner, [small, large]) = exhausted(SuspendType::Priority);

    let a = kernel.create_task("a", 10);
    assert_eq!(kernel.allocate_memory(pool, 100, Suspend::Forever), Ok(Poll::Pending));

    let b = kernel.create_task("b", 20);
    assert_eq!(kernel.allocate_memory(pool, 100, Suspend::Forever), Ok(Poll::Pending));

    kernel.delete_memory_pool(pool).unwrap();
    kernel.validate();

    assert_eq!(kernel.current_task(), Some(a));
    assert_eq!(kernel.task_state(b), Ok(State::Ready));
    assert_eq!(kernel.task_state(owner), Ok(State::Ready));
    assert_eq!(kernel.resume_status(a), Err(Error::PoolDeleted));
    assert_eq!(kernel.resume_status(b), Err(Error::PoolDeleted));

    assert_eq!(kernel.memory_pool_information(pool), Err(Error::InvalidPool));
    assert_eq!(kernel.deallocate_memory(small), Err(Error::InvalidPointer));
    assert_eq!(kernel.deallocate_memory(large), Err(Error::InvalidPointer));
}

#[rstest]
#[timeout(Duration::from_secs(1))]
fn terminate_waiter() {
    let (mut kernel, pool, owner, [small, _]) = exhausted(SuspendType::Fifo);

    let a = kernel.create_task("a", 10);
    assert_eq!(kernel.allocate_memory(pool, 40, Suspend::Forever), Ok(Poll::Pending));
    assert_eq!(kernel.current_task(), Some(owner));

    kernel.terminate_task(a).unwrap();
    assert_eq!(waiting(&kernel, pool), 0);
    assert_eq!(kernel.resume_status(a), Err(Error::TaskTerminated));
    kernel.validate();

    kernel.deallocate_memory(small).unwrap();
    assert_eq!(available(&kernel, pool), 60);
    assert_eq!(kernel.task_state(a), Ok(State::Terminated));
    kernel.validate();
}

/// Создаёт пул на 480 свободных байт и исчерпывает его двумя блоками на 60 и 404 байта.
/// Возвращает ядро, пул, задачу-владельца этих блоков и сами блоки.
fn exhausted(suspend_type: SuspendType) -> (Kernel, PoolId, TaskId, [Address; 2]) {
    let mut kernel = Kernel::new();
    let owner = kernel.create_task("owner", 30);

    let pool = kernel
        .create_memory_pool("pool", Address::new(0x1000), 512, 8, suspend_type)
        .unwrap();

    let small = ready(kernel.allocate_memory(pool, 60, Suspend::NoSuspend));
    let large = ready(kernel.allocate_memory(pool, 404, Suspend::NoSuspend));

    assert_eq!(available(&kernel, pool), 0);
    kernel.validate();

    (kernel, pool, owner, [small, large])
}

fn available(
    kernel: &Kernel,
    pool: PoolId,
) -> usize {
    kernel.memory_pool(pool).unwrap().available()
}

fn waiting(
    kernel: &Kernel,
    pool: PoolId,
) -> usize {
    *kernel.memory_pool_information(pool).unwrap().tasks_waiting()
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
