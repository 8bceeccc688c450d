/*!

This is the long-form manual for `consumption_compare` and `metercmp`.

## Input formats

Both periods are read from a table with a header row. The following formats are supported:
* `xlsx` Excel workbooks. The first worksheet is used unless a worksheet name is provided.
* `csv` Comma Separated Values. The delimiter can be changed with `csvDelimiter`.
  Fields that are not valid UTF-8 are read as Latin-1.

Error cells of a workbook (`#N/A`, `#REF!`) are read as empty cells.

When no provider is given, files ending in `.csv` are read as CSV and everything else as Excel.

Three columns are required in each table:

| column | default accepted names |
|--------|------------------------|
| sector | `Setor` |
| current counter | `Contador Atual`, `contador_atual`, `contadorAtual` |
| previous counter | `Contador Anterior`, `contador_anterior`, `contadorAnterior` |

With the default `fuzzy` matching, the header cells are compared after removing
spaces and punctuation and ignoring the case, so `CONTADOR-ATUAL` is accepted too.
The `exact` matching only ignores leading and trailing spaces.

Counter cells that are not numbers are counted as 0. Run with `--verbose` to see
every cell that was replaced.

## Processing

For each file:
1. the known informative columns (`PATM`, `impressora`, `Franquia`, `Consumo`, ...) are ignored
2. the rows of the non-billed transformer groups are excluded (`Trafos: ... 4784/4709/4788`)
3. the consumption of each row is `current counter - previous counter`
4. the consumption is summed for each sector

Both periods are then joined on the sector. A sector that only appears in one
period is still reported, with a consumption of 0 for the other period.

| output column | meaning |
|---------------|---------|
| `difference` | current consumption - previous consumption |
| `pctVariation` | `abs(difference) / previous consumption * 100`, or 0 when there was no previous consumption |
| `trend` | `increased`, `decreased` or `unchanged`, from the sign of the difference |

## Configuration

All the options can be provided in a JSON file with the `--config` flag. The paths
of the input files are relative to the location of the configuration file.

```json
{
  "outputSettings": { "reportName": "February", "topSectors": 5 },
  "previous": { "filePath": "january.xlsx" },
  "current": { "filePath": "february.xlsx", "excelWorksheetName": "Leituras" },
  "columns": { "matching": "fuzzy", "sector": ["Setor", "Departamento"] },
  "rules": {
    "dropZeroReadings": false,
    "dropBothZero": true,
    "pctVariation": "absolute"
  },
  "sectors": []
}
```

### `rules`

* `dropZeroReadings` (default false) ignore the rows in which one of the counters is 0.
  This is how meters that were not read during the month are usually reported.
* `dropBothZero` (default false) do not report the sectors without consumption in both periods.
* `pctVariation` (`absolute` by default, or `signed`) with `signed`, the variation is
  negative when the consumption decreased.
* `excludedSectorPatterns` regular expressions. Any sector in which one of them is
  found is excluded. Replaces the default list.

### `columns`

* `matching` `fuzzy` (default) or `exact`
* `sector`, `counterCurrent`, `counterPrevious` the accepted names for each column,
  in order of preference. Replaces the default names.
* `dropped` the columns to ignore. Replaces the default list.

### `sectors`

If not empty, only these sectors are included in the summary and in the outputs.

## Outputs

* `--out FILE` writes a JSON summary (use `stdout` to print it). It contains the
  totals of increase and decrease, the top sectors in each direction and all the rows.
* `--csv-out FILE` writes the comparison table. With `--split-by-trend`, two more
  files with the increased and the decreased sectors are written next to it.
* `--reference FILE` checks the JSON summary against a previous summary and fails
  if they differ.

When one of the files misses a required column, nothing is compared and the
errors of both files are reported.

## Single month

Without a previous file (no `--previous` and no `previous` in the configuration),
`metercmp` analyzes the current file on its own. The JSON summary then contains
the total consumption, the `topConsumers` and the consumption of each sector, and
`--csv-out` writes a `sector,consumption` table.

*/
