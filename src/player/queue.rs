//! Cola de reproducción ordenada.

use rand::Rng;
use std::collections::VecDeque;
use tracing::debug;

use super::track::Track;
use super::QueueError;

pub const TRACKS_PER_PAGE: usize = 10;

/// Secuencia ordenada de tracks; orden de inserción = orden de reproducción
/// salvo `move` / `shuffle`.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    tracks: VecDeque<Track>,
}

/// Una página del listado de la cola.
#[derive(Debug, Clone)]
pub struct QueuePage {
    /// Pares (posición 1-based en la cola, track).
    pub items: Vec<(usize, Track)>,
    pub page: usize,
    pub page_count: usize,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Añade al final.
    pub fn enqueue(&mut self, track: Track) {
        debug!("➕ Encolado: {}", track.title);
        self.tracks.push_back(track);
    }

    /// Saca y devuelve el primer elemento.
    pub fn dequeue_head(&mut self) -> Option<Track> {
        self.tracks.pop_front()
    }

    /// Reinserta en cabeza (reintentos y modo loop).
    pub fn requeue_front(&mut self, track: Track) {
        self.tracks.push_front(track);
    }

    /// Quita el elemento en `index` (0-based). Índices fuera de rango no
    /// tocan la cola.
    pub fn remove(&mut self, index: usize) -> Result<Track, QueueError> {
        if index >= self.tracks.len() {
            return Err(QueueError::InvalidIndex);
        }

        // index < len, el remove no puede fallar
        Ok(self.tracks.remove(index).unwrap())
    }

    /// Mueve el elemento de `from` a `to` (ambos 0-based) rotando en una
    /// posición todo lo que queda entre medias.
    pub fn move_track(&mut self, from: usize, to: usize) -> Result<&Track, QueueError> {
        if from == to || from >= self.tracks.len() || to >= self.tracks.len() {
            return Err(QueueError::InvalidIndex);
        }

        let track = self.tracks.remove(from).unwrap();
        self.tracks.insert(to, track);
        debug!("📍 Track movido de {} a {}", from, to);

        Ok(&self.tracks[to])
    }

    /// Descarta hasta `count` elementos de la cabeza; devuelve cuántos cayeron.
    pub fn drop_from_head(&mut self, count: usize) -> usize {
        let dropped = count.min(self.tracks.len());
        self.tracks.drain(..dropped);
        dropped
    }

    /// Permutación uniforme (Fisher–Yates).
    pub fn shuffle(&mut self) {
        self.shuffle_with(&mut rand::thread_rng());
    }

    pub fn shuffle_with<R: Rng>(&mut self, rng: &mut R) {
        for i in (1..self.tracks.len()).rev() {
            let j = rng.gen_range(0..=i);
            self.tracks.swap(i, j);
        }
    }

    /// Vacía la cola. No afecta al track en reproducción.
    pub fn clear(&mut self) {
        self.tracks.clear();
        debug!("🗑️ Cola vaciada");
    }

    /// Página del listado. `input` es lo que escribió el usuario: un número
    /// 1-based, `"last"`, o nada (página 0). Entradas no numéricas o fuera
    /// de rango se llevan a la página válida más cercana. Devuelve `None`
    /// con la cola vacía.
    pub fn page(&self, input: Option<&str>) -> Option<QueuePage> {
        if self.tracks.is_empty() {
            return None;
        }

        let page_count = (self.tracks.len() + TRACKS_PER_PAGE - 1) / TRACKS_PER_PAGE;
        let page = match input {
            Some("last") => page_count - 1,
            Some(s) => match s.trim().parse::<i64>() {
                // Números por encima del final se llevan a la última página;
                // basura o negativos, a la primera.
                Ok(n) if n >= 1 => ((n - 1) as usize).min(page_count - 1),
                _ => 0,
            },
            None => 0,
        };

        let start = page * TRACKS_PER_PAGE;
        let end = (start + TRACKS_PER_PAGE).min(self.tracks.len());
        let items = (start..end)
            .map(|i| (i + 1, self.tracks[i].clone()))
            .collect();

        Some(QueuePage {
            items,
            page,
            page_count,
        })
    }

    /// Títulos en orden, para listados y tests.
    pub fn titles(&self) -> Vec<String> {
        self.tracks.iter().map(|t| t.title.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn queue_of(titles: &[&str]) -> PlaybackQueue {
        let mut queue = PlaybackQueue::new();
        for title in titles {
            queue.enqueue(Track::new(*title, *title, 100));
        }
        queue
    }

    #[test]
    fn test_enqueue_preserves_insertion_order() {
        let mut queue = queue_of(&["A", "B", "C"]);
        assert_eq!(queue.titles(), vec!["A", "B", "C"]);
        assert_eq!(queue.dequeue_head().unwrap().title, "A");
        assert_eq!(queue.dequeue_head().unwrap().title, "B");
    }

    #[test]
    fn test_requeue_front() {
        let mut queue = queue_of(&["B", "C"]);
        queue.requeue_front(Track::new("A", "A", 1));
        assert_eq!(queue.titles(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_move_rotates_between_indices() {
        // [A,B,C,D], move(2,0) => [C,A,B,D]
        let mut queue = queue_of(&["A", "B", "C", "D"]);
        let moved = queue.move_track(2, 0).unwrap();
        assert_eq!(moved.title, "C");
        assert_eq!(queue.titles(), vec!["C", "A", "B", "D"]);
    }

    #[test]
    fn test_move_rotates_forward_too() {
        let mut queue = queue_of(&["A", "B", "C", "D"]);
        queue.move_track(0, 2).unwrap();
        assert_eq!(queue.titles(), vec!["B", "C", "A", "D"]);
    }

    #[test]
    fn test_move_rejects_bad_indices() {
        let mut queue = queue_of(&["A", "B"]);
        assert_eq!(queue.move_track(0, 0), Err(QueueError::InvalidIndex));
        assert_eq!(queue.move_track(0, 2), Err(QueueError::InvalidIndex));
        assert_eq!(queue.move_track(5, 0), Err(QueueError::InvalidIndex));
        assert_eq!(queue.titles(), vec!["A", "B"]);
    }

    #[test]
    fn test_remove() {
        let mut queue = queue_of(&["A", "B", "C"]);
        let removed = queue.remove(1).unwrap();
        assert_eq!(removed.title, "B");
        assert_eq!(queue.titles(), vec!["A", "C"]);
    }

    #[test]
    fn test_remove_invalid_index_leaves_queue_unchanged() {
        let mut queue = queue_of(&["A", "B", "C"]);
        assert_eq!(queue.remove(3), Err(QueueError::InvalidIndex));
        assert_eq!(queue.titles(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_drop_from_head_clamps() {
        let mut queue = queue_of(&["A", "B", "C"]);
        assert_eq!(queue.drop_from_head(2), 2);
        assert_eq!(queue.titles(), vec!["C"]);
        assert_eq!(queue.drop_from_head(10), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_shuffle_is_a_permutation() {
        let titles: Vec<String> = (0..50).map(|i| format!("t{}", i)).collect();
        let mut queue = PlaybackQueue::new();
        for t in &titles {
            queue.enqueue(Track::new(t.clone(), t.clone(), 1));
        }

        let mut rng = StdRng::seed_from_u64(7);
        queue.shuffle_with(&mut rng);

        let mut shuffled = queue.titles();
        assert_eq!(shuffled.len(), titles.len());
        shuffled.sort();
        let mut expected = titles.clone();
        expected.sort();
        assert_eq!(shuffled, expected);
    }

    #[test]
    fn test_shuffle_distribution_is_roughly_uniform() {
        // Con 4 elementos, cada título debería caer en la posición 0 en
        // ~25% de los ensayos.
        let mut counts = std::collections::HashMap::new();
        let mut rng = StdRng::seed_from_u64(42);

        const TRIALS: usize = 4000;
        for _ in 0..TRIALS {
            let mut queue = queue_of(&["A", "B", "C", "D"]);
            queue.shuffle_with(&mut rng);
            *counts.entry(queue.titles()[0].clone()).or_insert(0usize) += 1;
        }

        for (_, count) in counts {
            let share = count as f64 / TRIALS as f64;
            assert!((0.20..0.30).contains(&share), "share fuera de rango: {}", share);
        }
    }

    #[test]
    fn test_paging() {
        let titles: Vec<String> = (1..=25).map(|i| format!("t{}", i)).collect();
        let mut queue = PlaybackQueue::new();
        for t in &titles {
            queue.enqueue(Track::new(t.clone(), t.clone(), 1));
        }

        let first = queue.page(None).unwrap();
        assert_eq!(first.page, 0);
        assert_eq!(first.page_count, 3);
        assert_eq!(first.items.len(), 10);
        assert_eq!(first.items[0].0, 1);

        let last = queue.page(Some("last")).unwrap();
        assert_eq!(last.page, 2);
        assert_eq!(last.items.len(), 5);
        assert_eq!(last.items[0].0, 21);
        assert_eq!(last.items[4].0, 25);

        // Fuera de rango o basura => se lleva a una página válida
        assert_eq!(queue.page(Some("99")).unwrap().page, 2);
        assert_eq!(queue.page(Some("abc")).unwrap().page, 0);
        assert_eq!(queue.page(Some("-2")).unwrap().page, 0);
        assert_eq!(queue.page(Some("2")).unwrap().page, 1);
    }

    #[test]
    fn test_paging_empty_queue() {
        let queue = PlaybackQueue::new();
        assert!(queue.page(None).is_none());
    }

    #[test]
    fn test_clear() {
        let mut queue = queue_of(&["A", "B"]);
        queue.clear();
        assert!(queue.is_empty());
    }
}
