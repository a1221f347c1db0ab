//! Node paths through the mesh. Nodes are numbered row-major, `id = y * x_dim + x`.

fn coords(x_dim: usize, node: usize) -> (usize, usize) {
    (node % x_dim, node / x_dim)
}

/// Every hop moves to a mesh neighbour and every node lies inside the `x_dim * y_dim` mesh.
pub fn is_valid_path(x_dim: usize, y_dim: usize, path: &[usize]) -> bool {
    if path.is_empty() || x_dim == 0 || path.iter().any(|&n| n >= x_dim * y_dim) {
        return false;
    }
    path.windows(2).all(|hop| {
        let (ax, ay) = coords(x_dim, hop[0]);
        let (bx, by) = coords(x_dim, hop[1]);
        ax.abs_diff(bx) + ay.abs_diff(by) == 1
    })
}

fn extend_x(x_dim: usize, path: &mut Vec<usize>, (mut x, y): (usize, usize), dest_x: usize) -> (usize, usize) {
    while x != dest_x {
        x = if x < dest_x { x + 1 } else { x - 1 };
        path.push(y * x_dim + x);
    }
    (x, y)
}

fn extend_y(x_dim: usize, path: &mut Vec<usize>, (x, mut y): (usize, usize), dest_y: usize) -> (usize, usize) {
    while y != dest_y {
        y = if y < dest_y { y + 1 } else { y - 1 };
        path.push(y * x_dim + x);
    }
    (x, y)
}

/// Dimension-ordered route starting at `from`, which is included.
fn route(x_dim: usize, from: (usize, usize), dest: usize, x_first: bool) -> Vec<usize> {
    let (dest_x, dest_y) = coords(x_dim, dest);
    let mut path = vec![from.1 * x_dim + from.0];
    if x_first {
        let at = extend_x(x_dim, &mut path, from, dest_x);
        extend_y(x_dim, &mut path, at, dest_y);
    } else {
        let at = extend_y(x_dim, &mut path, from, dest_y);
        extend_x(x_dim, &mut path, at, dest_x);
    }
    path
}

/// X first, then Y. This is the primary path of an automatically routed channel.
pub fn find_path_xy(x_dim: usize, src: usize, dest: usize) -> Vec<usize> {
    route(x_dim, coords(x_dim, src), dest, true)
}

pub fn find_path_yx(x_dim: usize, src: usize, dest: usize) -> Vec<usize> {
    route(x_dim, coords(x_dim, src), dest, false)
}

/// Alternative path sharing no link with [`find_path_xy`].
///
/// Endpoints in different rows and columns take Y-X routing. Endpoints in the same column
/// first step sideways, towards the nearer mesh edge where possible, then route Y-X; endpoints
/// in the same row step vertically and route X-Y. `None` when the mesh is too narrow to step
/// aside.
pub fn find_path_b(x_dim: usize, y_dim: usize, src: usize, dest: usize) -> Option<Vec<usize>> {
    let (x, y) = coords(x_dim, src);
    let (dest_x, dest_y) = coords(x_dim, dest);
    if x != dest_x && y != dest_y {
        return Some(find_path_yx(x_dim, src, dest));
    }
    if src == dest {
        return Some(vec![src]);
    }
    let (side, x_first) = if x == dest_x {
        if x_dim < 2 {
            return None;
        }
        let step = if (x <= x_dim / 2 && x > 0) || x == x_dim - 1 { x - 1 } else { x + 1 };
        ((step, y), false)
    } else {
        if y_dim < 2 {
            return None;
        }
        let step = if (y <= y_dim / 2 && y > 0) || y == y_dim - 1 { y - 1 } else { y + 1 };
        ((x, step), true)
    };
    let mut path = vec![src];
    path.extend(route(x_dim, side, dest, x_first));
    Some(path)
}
