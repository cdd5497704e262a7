use alloc::vec::Vec;
use core::task::Poll;

use common::{
    Error,
    List,
    Priority,
    Result,
    Table,
    log::{
        debug,
        info,
    },
};

use crate::{
    mailbox::Mailbox,
    memory::MemoryPool,
    scheduler::Scheduler,
    task::{
        Outcome,
        State,
        Suspend,
        Task,
        TaskId,
        Wait,
    },
};

/// Ядро --- владелец всех задач, пулов памяти и почтовых ящиков.
///
/// Каждая изменяющая операция выполняется под блокировкой планирования.
/// Пробуждённые ею задачи получают процессор только после снятия внешней блокировки.
///
/// Вызывающей задачей любой операции считается исполняемая задача [`Kernel::current_task()`].
#[derive(Debug, Default)]
pub struct Kernel {
    /// Таблица задач.
    pub(crate) tasks: Table<Task>,

    /// Планировщик.
    pub(crate) scheduler: Scheduler,

    /// Таблица пулов памяти.
    pub(crate) pools: Table<MemoryPool>,

    /// Таблица почтовых ящиков.
    pub(crate) mailboxes: Table<Mailbox>,

    /// Текущее время в тиках.
    ticks: u64,
}

impl Kernel {
    /// Создаёт ядро без объектов.
    pub fn new() -> Self {
        Self::default()
    }

    /// Текущее время в тиках.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Планировщик.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Задача `task`.
    pub fn task(
        &self,
        task: TaskId,
    ) -> Result<&Task> {
        self.tasks.get(task).ok_or(Error::InvalidTask)
    }

    /// Создаёт задачу с именем `name` и приоритетом `priority`
    /// и ставит её в очередь готовых задач.
    /// Если она срочнее исполняемой задачи, то сразу её вытесняет.
    pub fn create_task(
        &mut self,
        name: &str,
        priority: Priority,
    ) -> TaskId {
        self.protect(|kernel| {
            let task = kernel.tasks.insert_with(|id| Task::new(id, name, priority));

            info!(%task, name, priority, "create task");

            if kernel.scheduler.start(&mut kernel.tasks, task) {
                kernel.scheduler.control_to_system(&mut kernel.tasks);
            }

            task
        })
    }

    /// Принудительно завершает задачу `task`.
    ///
    /// Если задача ждёт, она исключается из очереди ожидания объекта,
    /// а результатом её ожидания становится [`Error::TaskTerminated`].
    pub fn terminate_task(
        &mut self,
        task: TaskId,
    ) -> Result<()> {
        let state = self.task_state(task)?;

        if state == State::Terminated {
            return Ok(());
        }

        self.protect(|kernel| {
            if kernel.cancel_wait(task).is_some() {
                if let Some(terminated) = kernel.tasks.get_mut(task) {
                    terminated.status = Some(Err(Error::TaskTerminated));
                }
            } else {
                kernel.scheduler.remove(&mut kernel.tasks, task);
            }

            if let Some(terminated) = kernel.tasks.get_mut(task) {
                terminated.state = State::Terminated;
                terminated.wait = None;
                terminated.deadline = None;
            }

            info!(%task, ?state, "terminate task");
        });

        Ok(())
    }

    /// Удаляет завершённую задачу `task`.
    ///
    /// Возвращает ошибку [`Error::InvalidOperation`], если задача не завершена.
    pub fn delete_task(
        &mut self,
        task: TaskId,
    ) -> Result<()> {
        if self.task_state(task)? != State::Terminated {
            return Err(Error::InvalidOperation);
        }

        self.protect(|kernel| kernel.tasks.remove(task));

        info!(%task, "delete task");

        Ok(())
    }

    /// Уступает процессор готовым задачам того же или более срочного приоритета.
    pub fn relinquish(&mut self) {
        self.protect(|kernel| kernel.scheduler.control_to_system(&mut kernel.tasks));
    }

    /// Исполняемая задача.
    pub fn current_task(&self) -> Option<TaskId> {
        self.scheduler.current()
    }

    /// Приоритет задачи `task`.
    pub fn task_priority(
        &self,
        task: TaskId,
    ) -> Result<Priority> {
        self.task(task).map(Task::priority)
    }

    /// Состояние задачи `task`.
    pub fn task_state(
        &self,
        task: TaskId,
    ) -> Result<State> {
        self.task(task).map(Task::state)
    }

    /// Количество существующих задач.
    pub fn established_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Забирает результат ожидания задачи `task`, который записал разбудивший её код.
    ///
    /// Возвращает [`Poll::Pending`], пока результата нет,
    /// и ошибку, которой завершилось ожидание, если оно не удалось.
    pub fn resume_status(
        &mut self,
        task: TaskId,
    ) -> Result<Poll<Outcome>> {
        let task = self.tasks.get_mut(task).ok_or(Error::InvalidTask)?;

        match task.status.take() {
            Some(Ok(outcome)) => Ok(Poll::Ready(outcome)),
            Some(Err(error)) => Err(error),
            None => Ok(Poll::Pending),
        }
    }

    /// Захватывает блокировку планирования.
    /// Пока она захвачена, исполняемая задача не будет вытеснена.
    pub fn schedule_lock(&mut self) {
        self.scheduler.lock();
    }

    /// Снимает блокировку планирования.
    /// При снятии внешней блокировки выполняет отложенное переключение задачи.
    ///
    /// Возвращает ошибку [`Error::InvalidOperation`], если блокировка не захвачена.
    pub fn schedule_unlock(&mut self) -> Result<()> {
        if !self.scheduler.is_locked() {
            return Err(Error::InvalidOperation);
        }

        self.scheduler.unlock(&mut self.tasks);

        Ok(())
    }

    /// Входит в обработчик прерывания.
    /// Пока он исполняется, ожидание запрещено, а переключение задач откладывается.
    pub fn enter_interrupt(&mut self) {
        self.scheduler.enter_interrupt();
    }

    /// Выходит из обработчика прерывания.
    ///
    /// Возвращает ошибку [`Error::InvalidOperation`], если обработчик не исполняется.
    pub fn leave_interrupt(&mut self) -> Result<()> {
        if !self.scheduler.in_interrupt() {
            return Err(Error::InvalidOperation);
        }

        self.scheduler.leave_interrupt(&mut self.tasks);

        Ok(())
    }

    /// Продвигает время на `ticks` тиков.
    /// Задачи, тайм-аут ожидания которых истёк, пробуждаются с ошибкой [`Error::Timeout`]
    /// в порядке истечения их тайм-аутов.
    pub fn tick(
        &mut self,
        ticks: u64,
    ) {
        self.protect(|kernel| {
            kernel.ticks = kernel.ticks.saturating_add(ticks);

            let now = kernel.ticks;
            let mut expired: Vec<_> = kernel
                .tasks
                .iter()
                .filter_map(|(task, state)| {
                    state.deadline.filter(|&deadline| deadline <= now).map(|deadline| (deadline, task))
                })
                .collect();
            expired.sort_unstable();

            let mut preempt = false;

            for (deadline, task) in expired {
                if let Some(wait) = kernel.cancel_wait(task) {
                    debug!(%task, deadline, now, ?wait, "timeout");
                    preempt |= kernel.wake(task, Err(Error::Timeout));
                }
            }

            if preempt {
                kernel.scheduler.control_to_system(&mut kernel.tasks);
            }
        });
    }

    /// Проверяет инварианты всех объектов ядра.
    ///
    /// # Panics
    ///
    /// Паникует, если инварианты нарушены.
    pub fn validate(&self) {
        self.scheduler.validate(&self.tasks);

        for (_, pool) in self.pools.iter() {
            pool.validate(&self.tasks);
        }

        for (mailbox, block) in self.mailboxes.iter() {
            block.validate(mailbox, &self.tasks);
        }

        for (id, task) in self.tasks.iter() {
            match (task.state(), task.wait()) {
                (State::Suspended(reason), Some(wait)) => {
                    assert_eq!(reason, wait.reason());

                    let queue = match *wait {
                        Wait::Memory { pool, .. } => self.pools.get(pool).map(|pool| pool.suspension),
                        Wait::Mailbox { mailbox, .. } => {
                            self.mailboxes.get(mailbox).map(|mailbox| mailbox.suspension)
                        },
                    };

                    assert!(
                        queue.is_some_and(|queue| queue.iter(&self.tasks).any(|waiter| waiter == id)),
                        "task {id} {task} is not in the queue of {wait:?}",
                    );
                },
                (State::Suspended(_), None) => panic!("task {id} {task} waits for nothing"),
                (_, Some(wait)) => panic!("task {id} {task} is not suspended but has {wait:?}"),
                _ => {},
            }
        }
    }

    /// Выполняет `critical_section` под блокировкой планирования.
    /// Отложенное в ней переключение задачи выполняется после снятия блокировки.
    pub(crate) fn protect<R>(
        &mut self,
        critical_section: impl FnOnce(&mut Self) -> R,
    ) -> R {
        self.scheduler.lock();
        let result = critical_section(self);
        self.scheduler.unlock(&mut self.tasks);

        #[cfg(feature = "validate")]
        self.validate();

        result
    }

    /// Проверяет, что ожидание `suspend` допустимо в текущем контексте.
    /// Ждать нельзя из обработчика прерывания, без исполняемой задачи
    /// и под захваченной через [`Kernel::schedule_lock()`] блокировкой планирования.
    pub(crate) fn check_suspend(
        &self,
        suspend: Suspend,
    ) -> Result<()> {
        if suspend.is_suspend() && !self.scheduler.is_task_context() {
            Err(Error::InvalidSuspend)
        } else {
            Ok(())
        }
    }

    /// Переводит исполняемую задачу в ожидание `wait`.
    /// Поставить её в очередь ожидания объекта должен вызывающий код.
    ///
    /// Возвращает идентификатор ожидающей задачи.
    pub(crate) fn suspend_current(
        &mut self,
        wait: Wait,
        suspend: Suspend,
    ) -> Result<TaskId> {
        let task = self.scheduler.current().ok_or(Error::InvalidSuspend)?;

        let deadline = match suspend {
            Suspend::Timeout(ticks) => Some(self.ticks.saturating_add(ticks)),
            Suspend::NoSuspend | Suspend::Forever => None,
        };

        let waiting = self.tasks.get_mut(task).ok_or(Error::InvalidTask)?;
        waiting.wait = Some(wait);
        waiting.deadline = deadline;
        waiting.status = None;

        self.scheduler.suspend_current(&mut self.tasks, wait.reason());

        Ok(task)
    }

    /// Пробуждает ожидающую задачу `task`, записав ей результат ожидания `status`.
    /// Исключить её из очереди ожидания объекта должен вызывающий код.
    ///
    /// Возвращает `true`, если задача должна вытеснить исполняемую.
    pub(crate) fn wake(
        &mut self,
        task: TaskId,
        status: Result<Outcome>,
    ) -> bool {
        if let Some(waiting) = self.tasks.get_mut(task) {
            waiting.wait = None;
            waiting.deadline = None;
            waiting.status = Some(status);
        }

        self.scheduler.resume(&mut self.tasks, task)
    }

    /// Пробуждает все задачи очереди `queue`, уже изъятой из объекта,
    /// в порядке очереди и с одним и тем же результатом ожидания `status`.
    ///
    /// Возвращает `true`, если какая-либо из них должна вытеснить исполняемую.
    pub(crate) fn wake_all(
        &mut self,
        mut queue: List<TaskId>,
        status: Result<Outcome>,
    ) -> bool {
        let mut preempt = false;

        while let Some(task) = queue.pop_front(&mut self.tasks) {
            preempt |= self.wake(task, status);
        }

        preempt
    }

    /// Прерывает ожидание задачи `task`, исключая её из очереди ожидаемого объекта.
    /// Сама задача остаётся в состоянии ожидания.
    ///
    /// Возвращает блок ожидания или [`None`], если задача ничего не ждёт.
    fn cancel_wait(
        &mut self,
        task: TaskId,
    ) -> Option<Wait> {
        let wait = self.tasks.get(task).and_then(Task::wait).copied()?;

        match wait {
            Wait::Memory { pool, .. } => self.unlink_memory_waiter(pool, task),
            Wait::Mailbox { mailbox, .. } => self.unlink_mailbox_waiter(mailbox, task),
        }

        Some(wait)
    }
}
