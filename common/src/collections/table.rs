use alloc::vec::Vec;
use core::{
    cmp::Ordering,
    fmt,
    hash::{
        Hash,
        Hasher,
    },
    marker::PhantomData,
    mem,
};

/// Идентификатор объекта типа `T` в таблице [`Table`].
///
/// Состоит из номера слота в таблице и эпохи этого слота.
/// При удалении объекта эпоха слота увеличивается,
/// поэтому устаревший идентификатор никогда больше не пройдёт проверку.
pub struct Id<T> {
    /// Эпоха слота в таблице.
    epoch: u32,

    /// Номер слота в таблице.
    slot: u32,

    /// Тип объектов таблицы, чтобы идентификаторы разных таблиц не смешивались.
    _tag: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    /// Создаёт идентификатор слота `slot` в эпохе `epoch`.
    fn new(
        slot: usize,
        epoch: u32,
    ) -> Self {
        Self {
            epoch,
            slot: slot.try_into().expect("table slot overflow"),
            _tag: PhantomData,
        }
    }

    /// Номер слота в таблице.
    pub fn slot(&self) -> usize {
        self.slot as usize
    }

    /// Эпоха слота в таблице.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {
}

impl<T> Eq for Id<T> {
}

impl<T> PartialEq for Id<T> {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.slot == other.slot && self.epoch == other.epoch
    }
}

impl<T> Ord for Id<T> {
    fn cmp(
        &self,
        other: &Self,
    ) -> Ordering {
        (self.slot, self.epoch).cmp(&(other.slot, other.epoch))
    }
}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(
        &self,
        other: &Self,
    ) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(
        &self,
        state: &mut H,
    ) {
        self.slot.hash(state);
        self.epoch.hash(state);
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        (self as &dyn fmt::Display).fmt(formatter)
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        write!(formatter, "{}:{}", self.slot, self.epoch)
    }
}

/// Слот таблицы.
enum Slot<T> {
    /// Слот свободен.
    Free {
        /// Эпоха, которую получит следующий объект этого слота.
        epoch: u32,

        /// Провязывает свободные слоты в интрусивный список.
        next: Option<usize>,
    },

    /// Слот занят.
    Used {
        /// Эпоха объекта, находящегося в слоте.
        epoch: u32,

        /// Объект, находящийся в слоте.
        value: T,
    },

    /// Эпоха слота исчерпана, слот больше не используется.
    Retired,
}

/// Таблица объектов ядра --- реестр объектов, адресуемых проверяемыми идентификаторами [`Id`].
///
/// Заменяет проверку поля-метки внутри управляющего блока объекта:
/// идентификатор удалённого объекта перестаёт находить объект в таблице.
pub struct Table<T> {
    /// Голова списка свободных слотов таблицы.
    free: Option<usize>,

    /// Количество объектов в таблице.
    len: usize,

    /// Слоты таблицы.
    slots: Vec<Slot<T>>,
}

impl<T> Table<T> {
    /// Возвращает пустую таблицу.
    pub const fn new() -> Self {
        Self {
            free: None,
            len: 0,
            slots: Vec::new(),
        }
    }

    /// Количество объектов в таблице.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Возвращает `true`, если в таблице нет объектов.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Помещает `value` в свободный слот таблицы и возвращает его идентификатор.
    pub fn insert(
        &mut self,
        value: T,
    ) -> Id<T> {
        self.insert_with(|_| value)
    }

    /// Помещает в свободный слот таблицы объект, который строит `make`
    /// по уже известному идентификатору этого объекта.
    pub fn insert_with(
        &mut self,
        make: impl FnOnce(Id<T>) -> T,
    ) -> Id<T> {
        let (slot, epoch) = match self.free {
            Some(slot) => match self.slots[slot] {
                Slot::Free { epoch, next } => {
                    self.free = next;
                    (slot, epoch)
                },
                _ => panic!("slot {slot} in the free list is not free"),
            },
            None => {
                self.slots.push(Slot::Free {
                    epoch: 0,
                    next: None,
                });
                (self.slots.len() - 1, 0)
            },
        };

        let id = Id::new(slot, epoch);

        self.slots[slot] = Slot::Used {
            epoch,
            value: make(id),
        };
        self.len += 1;

        id
    }

    /// Возвращает объект с идентификатором `id`,
    /// или [`None`], если такого объекта уже или ещё нет.
    pub fn get(
        &self,
        id: Id<T>,
    ) -> Option<&T> {
        match self.slots.get(id.slot())? {
            Slot::Used { epoch, value } if *epoch == id.epoch => Some(value),
            _ => None,
        }
    }

    /// Возвращает доступный на запись объект с идентификатором `id`,
    /// или [`None`], если такого объекта уже или ещё нет.
    pub fn get_mut(
        &mut self,
        id: Id<T>,
    ) -> Option<&mut T> {
        match self.slots.get_mut(id.slot())? {
            Slot::Used { epoch, value } if *epoch == id.epoch => Some(value),
            _ => None,
        }
    }

    /// Возвращает `true`, если `id` указывает на существующий объект.
    pub fn contains(
        &self,
        id: Id<T>,
    ) -> bool {
        self.get(id).is_some()
    }

    /// Удаляет объект с идентификатором `id` и возвращает его.
    /// При этом:
    ///   - Инкрементирует эпоху в освободившемся слоте.
    ///   - Вставляет слот в голову списка свободных слотов.
    ///     Слот с исчерпанной эпохой в список не вставляется.
    pub fn remove(
        &mut self,
        id: Id<T>,
    ) -> Option<T> {
        self.get(id)?;

        let slot = id.slot();
        let vacant = match id.epoch.checked_add(1) {
            Some(epoch) => Slot::Free {
                epoch,
                next: self.free,
            },
            None => Slot::Retired,
        };
        let is_reusable = matches!(vacant, Slot::Free { .. });

        let Slot::Used { value, .. } = mem::replace(&mut self.slots[slot], vacant) else {
            unreachable!();
        };

        if is_reusable {
            self.free = Some(slot);
        }
        self.len -= 1;

        Some(value)
    }

    /// Итератор по парам из идентификатора и объекта в порядке номеров слотов.
    pub fn iter(&self) -> impl Iterator<Item = (Id<T>, &T)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, entry)| match entry {
                Slot::Used { epoch, value } => Some((Id::new(slot, *epoch), value)),
                _ => None,
            })
    }

    /// Итератор по идентификаторам объектов в порядке номеров слотов.
    pub fn ids(&self) -> impl Iterator<Item = Id<T>> + '_ {
        self.iter().map(|(id, _)| id)
    }
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Table<T> {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        formatter.debug_map().entries(self.iter()).finish()
    }
}
