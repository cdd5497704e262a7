use common::{
    List,
    Table,
    log::{
        debug,
        trace,
    },
};

use crate::task::{
    State,
    SuspendReason,
    Task,
    TaskId,
};

/// Кооперативный приоритетный планировщик задач.
///
/// Вытеснение возможно только между вызовами ядра.
/// Внутри области, защищённой блокировкой планирования, решение о переключении задачи
/// откладывается и применяется один раз, при снятии внешней блокировки.
/// Это позволяет одной операции разбудить много задач без лавины переключений контекста.
#[derive(Debug, Default)]
pub struct Scheduler {
    /// Исполняемая задача.
    current: Option<TaskId>,

    /// Очередь готовых задач по приоритету, в порядке поступления среди равных.
    ready: List<TaskId>,

    /// Глубина вложенности блокировки планирования.
    lock_depth: usize,

    /// Глубина вложенности обработчиков прерываний.
    interrupt_depth: usize,

    /// Запрошено переключение задачи, которое отложено до снятия блокировки.
    dispatch_pending: bool,

    /// Количество переключений задач.
    dispatches: u64,
}

impl Scheduler {
    /// Исполняемая задача.
    pub fn current(&self) -> Option<TaskId> {
        self.current
    }

    /// Очередь готовых задач.
    pub fn ready(&self) -> &List<TaskId> {
        &self.ready
    }

    /// Количество переключений задач.
    pub fn dispatches(&self) -> u64 {
        self.dispatches
    }

    /// Возвращает `true`, если блокировка планирования захвачена.
    pub fn is_locked(&self) -> bool {
        self.lock_depth > 0
    }

    /// Возвращает `true`, если исполняется обработчик прерывания.
    pub fn in_interrupt(&self) -> bool {
        self.interrupt_depth > 0
    }

    /// Возвращает `true`, если код исполняется в контексте задачи
    /// и не держит блокировку планирования, то есть ему разрешено ждать.
    pub fn is_task_context(&self) -> bool {
        self.interrupt_depth == 0 && self.lock_depth == 0 && self.current.is_some()
    }

    /// Захватывает блокировку планирования. Блокировка допускает вложенность.
    pub(crate) fn lock(&mut self) {
        self.lock_depth += 1;
    }

    /// Снимает блокировку планирования.
    /// При снятии внешней блокировки выполняет отложенное переключение задачи.
    ///
    /// # Panics
    ///
    /// Паникует, если блокировка не захвачена.
    pub(crate) fn unlock(
        &mut self,
        tasks: &mut Table<Task>,
    ) {
        assert!(self.lock_depth > 0, "schedule lock is not held");
        self.lock_depth -= 1;
        self.schedule(tasks);
    }

    /// Входит в обработчик прерывания.
    pub(crate) fn enter_interrupt(&mut self) {
        self.interrupt_depth += 1;
    }

    /// Выходит из обработчика прерывания.
    /// При выходе из внешнего обработчика выполняет отложенное переключение задачи.
    ///
    /// # Panics
    ///
    /// Паникует, если код исполняется не в обработчике прерывания.
    pub(crate) fn leave_interrupt(
        &mut self,
        tasks: &mut Table<Task>,
    ) {
        assert!(self.interrupt_depth > 0, "not in an interrupt handler");
        self.interrupt_depth -= 1;
        self.schedule(tasks);
    }

    /// Делает ожидающую задачу `task` готовой к исполнению.
    /// Задачи в других состояниях не затрагиваются.
    ///
    /// Возвращает `true`, если это требует вытеснения исполняемой задачи,
    /// то есть если `task` строго срочнее её.
    /// Само вытеснение выполняет [`Scheduler::control_to_system()`].
    pub(crate) fn resume(
        &mut self,
        tasks: &mut Table<Task>,
        task: TaskId,
    ) -> bool {
        match tasks.get_mut(task) {
            Some(resumed) if matches!(resumed.state, State::Suspended(_)) => {
                resumed.state = State::Ready;
            },
            _ => return false,
        }

        let preempt = self.enqueue(tasks, task);
        trace!(%task, preempt, "resume");

        preempt
    }

    /// Ставит только что созданную задачу `task` в очередь готовых задач.
    /// Возвращает `true`, если это требует вытеснения исполняемой задачи.
    pub(crate) fn start(
        &mut self,
        tasks: &mut Table<Task>,
        task: TaskId,
    ) -> bool {
        let preempt = self.enqueue(tasks, task);
        trace!(%task, preempt, "start");

        preempt
    }

    /// Ставит готовую задачу `task` в очередь готовых задач по приоритету.
    /// Возвращает `true`, если `task` строго срочнее исполняемой задачи.
    fn enqueue(
        &mut self,
        tasks: &mut Table<Task>,
        task: TaskId,
    ) -> bool {
        let Some(priority) = tasks.get(task).map(Task::priority) else {
            return false;
        };

        self.ready.insert_by_priority(tasks, task);

        self.current
            .and_then(|current| tasks.get(current))
            .is_some_and(|current| priority < current.priority())
    }

    /// Снимает с исполнения текущую задачу, переводя её в состояние ожидания `reason`.
    /// Следующая задача получит управление при снятии блокировки планирования.
    pub(crate) fn suspend_current(
        &mut self,
        tasks: &mut Table<Task>,
        reason: SuspendReason,
    ) {
        if let Some(current) = self.current.take() {
            if let Some(task) = tasks.get_mut(current) {
                task.state = State::Suspended(reason);
            }
            trace!(task = %current, ?reason, "suspend");
        }

        self.dispatch_pending = true;
    }

    /// Исключает задачу `task` из планирования --- из очереди готовых задач
    /// или из числа исполняемых.
    pub(crate) fn remove(
        &mut self,
        tasks: &mut Table<Task>,
        task: TaskId,
    ) {
        if self.current == Some(task) {
            self.current = None;
            self.dispatch_pending = true;
        } else if tasks.get(task).is_some_and(|task| task.state() == State::Ready) {
            self.ready.remove(tasks, task);
        }
    }

    /// Передаёт управление системе для переключения задачи.
    /// Если захвачена блокировка планирования или исполняется обработчик прерывания,
    /// переключение откладывается до их завершения.
    pub(crate) fn control_to_system(
        &mut self,
        tasks: &mut Table<Task>,
    ) {
        self.dispatch_pending = true;
        self.schedule(tasks);
    }

    /// Выполняет переключение задачи, если оно запрошено и сейчас допустимо.
    fn schedule(
        &mut self,
        tasks: &mut Table<Task>,
    ) {
        if self.lock_depth > 0 || self.interrupt_depth > 0 {
            return;
        }

        let idle = self.current.is_none() && !self.ready.is_empty();

        if self.dispatch_pending || idle {
            self.dispatch(tasks);
        }
    }

    /// Ставит исполняемую задачу в очередь готовых задач
    /// и отдаёт процессор голове этой очереди.
    /// Вытесненная задача встаёт после готовых задач того же приоритета, а не перед ними.
    fn dispatch(
        &mut self,
        tasks: &mut Table<Task>,
    ) {
        self.dispatch_pending = false;

        let previous = self.current.take();

        if let Some(previous) = previous {
            if let Some(task) = tasks.get_mut(previous) {
                task.state = State::Ready;
                self.ready.insert_by_priority(tasks, previous);
            }
        }

        self.current = self.ready.pop_front(tasks);

        if let Some(current) = self.current {
            if let Some(task) = tasks.get_mut(current) {
                task.state = State::Running;
            }
        }

        if previous != self.current {
            self.dispatches += 1;
            debug!(from = ?previous, to = ?self.current, "dispatch");
        }
    }

    /// Проверяет инварианты планировщика.
    ///
    /// # Panics
    ///
    /// Паникует, если инварианты нарушены.
    pub fn validate(
        &self,
        tasks: &Table<Task>,
    ) {
        self.ready.validate(tasks);

        for task in self.ready.iter(tasks) {
            assert_eq!(tasks.get(task).map(Task::state), Some(State::Ready));
        }

        let mut previous = None;
        for task in self.ready.iter(tasks) {
            let priority = tasks.get(task).map(Task::priority);
            assert!(previous <= priority, "ready list is not ordered by priority");
            previous = priority;
        }

        for (id, task) in tasks.iter() {
            let running = task.state() == State::Running;
            assert_eq!(running, self.current == Some(id), "task {id} {task}");
        }
    }
}
