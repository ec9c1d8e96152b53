/*!

This is the long-form manual for `ahp_engine` and `ahpcalc`.

## Running a study

```text
ahpcalc --config my_study.json --out stdout
ahpcalc --config my_study.json --reference expected_summary.json --mode ideal
```

The summary is printed to the standard output with `--out stdout`, written to the
given path with `--out <path>`, and otherwise written to
`<outputDirectory>/<studyName>_summary.json` when the study declares an output directory.
With `--reference`, `ahpcalc` fails if the summary differs from the reference file.

## Study file

A study is a JSON file with the following sections.

### `outputSettings`

- `studyName` (string): name of the study, also used for the summary file name.
- `outputDirectory` (string, optional): directory of the summary, relative to the study file.

### `criteria` and `alternatives`

Criteria form a tree. A criterion without `parentId` sits directly under the goal.
Parents must be declared before their children.

```text
"criteria": [
  {"id": "cost", "name": "Cost"},
  {"id": "quality", "name": "Quality"},
  {"id": "speed", "name": "Speed", "parentId": "quality"}
],
"alternatives": [{"id": "bike", "name": "Bike"}, {"id": "car", "name": "Car"}]
```

The criteria without children are the leaf criteria: the alternatives are only
compared under them.

### `evaluators`

Every evaluator gives one comparison block per node of the tree:

- `goal` compares the top criteria,
- a parent criterion compares its children,
- a leaf criterion compares the alternatives.

Judgments refer to the elements by position, in declaration order. The judgment
`{"i": 0, "j": 1, "value": 3}` reads "the first element is moderately more important
than the second". Values must be on Saaty's scale: `1/9` to `9`. The reciprocal cells
are filled automatically, and cells that are not judged count as equal importance
(unless `requireCompleteMatrices` is set). Nodes with a single element need no block.

A leaf criterion may be measured instead of compared, with a `directInputs` entry:

```text
{"criterion": "cost", "isBenefit": false, "values": [100, 200, 400]}
```

Values are given per alternative. For a cost criterion (`isBenefit: false`), lower is
better and every value must be positive. When all the values are equal the
criterion cannot tell the alternatives apart, which is reported in the summary.

Optional fields: `weight` (for the `explicitWeight` policy) and `includeInGroup`
(default `true`).

### `rules`

All the options are optional.

| option | values | default |
|--------|--------|---------|
| `priorityMethod` | `geometricMean`, `powerIteration` | `geometricMean` |
| `consistencyThreshold` | number | `0.1` |
| `aggregationMode` | `distributive`, `ideal` | `distributive` |
| `groupPolicy` | `equal`, `explicitWeight`, `consistencyWeighted` | `equal` |
| `consistencyWeightFloor` | positive number | `0.01` |
| `impactHigh`, `impactMedium` | numbers | `0.10`, `0.05` |
| `requireCompleteMatrices` | boolean | `false` |
| `maxBuckets` | positive integer | `10000` |
| `maxSuggestions` | integer | `3` |

Under `consistencyWeighted`, an evaluator weighs `1 / (CR + floor)`, where CR is
the worst consistency ratio among their matrices.

### `sensitivity` (optional)

```text
"sensitivity": {"criterion": "cost", "deltas": [-0.1, 0.1]}
```

Each delta is added to the weight of the criterion, and the other criteria are
rescaled to keep their proportions. Without `criterion`, every leaf criterion is
analyzed. The analysis runs on the group result.

### `budget` (optional)

```text
"budget": {"total": 500, "mode": "binary", "costsFile": "costs.csv", "scenarios": [100, 450]}
```

- `mode`: `binary` selects a subset of the alternatives, `continuous` allocates
  amounts between per-item bounds (`bounds`, keyed by alternative).
- `costs` (map) or `costsFile` (CSV with `id,cost` rows, an optional header, relative
  to the study file): the cost of every alternative.
- `mandatory`, `excluded`: alternatives that must or must not be selected (binary mode).
- `scenarios`: other budgets to run the same optimization with.

The utility of an alternative is its group score.

## Summary

Numbers are written as strings with 4 decimals, so that summaries can be compared
exactly across platforms.

 */
